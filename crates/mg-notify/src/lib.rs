//! Best-effort reload notification for the prediction service.
//!
//! Promotion is the durable fact; this crate only tells a running serving
//! process to drop its in-memory model and pick up whatever is live now.
//! Failure here must never undo or fail a committed promotion — the caller
//! degrades to a warning instead.

mod discover;
mod retry;

pub use discover::{reload_candidates, EnvSnapshot};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http status {0}")]
    Status(u16),
    #[error("{0}")]
    Connect(String),
}

/// One reload attempt against one base URL. Implementations must apply their
/// own bounded per-attempt timeout.
#[async_trait::async_trait]
pub trait ReloadTransport: Send + Sync {
    async fn post_reload(&self, base_url: &str) -> Result<(), TransportError>;
}

/// `POST {base}/reload`, empty body; any 2xx is success.
#[derive(Debug, Clone)]
pub struct HttpReloadTransport {
    http: reqwest::Client,
}

impl HttpReloadTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl ReloadTransport for HttpReloadTransport {
    async fn post_reload(&self, base_url: &str) -> Result<(), TransportError> {
        let url = format!("{}/reload", base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

/// Object-safe seam between the controller and the notifier, so tests can
/// substitute a scripted outcome.
#[async_trait::async_trait]
pub trait ReloadSignal: Send + Sync {
    /// True when at least one candidate acknowledged the reload.
    async fn notify(&self) -> bool;
}

/// Walks an ordered candidate list with per-candidate retry. First candidate
/// to acknowledge wins; every attempt is logged for diagnostics.
pub struct ReloadNotifier<T, S = TokioSleeper> {
    transport: T,
    policy: RetryPolicy,
    candidates: Vec<String>,
    sleeper: S,
}

impl<T: ReloadTransport> ReloadNotifier<T, TokioSleeper> {
    pub fn new(transport: T, policy: RetryPolicy, candidates: Vec<String>) -> Self {
        Self::with_sleeper(transport, policy, candidates, TokioSleeper)
    }
}

impl<T: ReloadTransport, S: Sleeper> ReloadNotifier<T, S> {
    pub fn with_sleeper(
        transport: T,
        policy: RetryPolicy,
        candidates: Vec<String>,
        sleeper: S,
    ) -> Self {
        Self {
            transport,
            policy,
            candidates,
            sleeper,
        }
    }

    async fn try_candidate(&self, url: &str) -> bool {
        for attempt in 1..=self.policy.max_attempts {
            match self.transport.post_reload(url).await {
                Ok(()) => {
                    info!(url, attempt, "api reload acknowledged");
                    return true;
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "api reload attempt failed");
                    if attempt < self.policy.max_attempts {
                        self.sleeper.sleep(self.policy.delay).await;
                    }
                }
            }
        }
        false
    }
}

#[async_trait::async_trait]
impl<T: ReloadTransport, S: Sleeper> ReloadSignal for ReloadNotifier<T, S> {
    async fn notify(&self) -> bool {
        for url in &self.candidates {
            if self.try_candidate(url).await {
                return true;
            }
        }
        warn!(
            candidates = self.candidates.len(),
            "api reload failed on every candidate; serving process may hold a stale model"
        );
        false
    }
}
