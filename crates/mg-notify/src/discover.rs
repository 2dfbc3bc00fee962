//! Reload-target discovery.
//!
//! Which addresses can plausibly reach the prediction service depends on
//! where this process runs: inside a container the service is a network
//! alias or sits on the container host; on a bare host it is loopback or a
//! locally containerised alias. The probe result is captured once into an
//! [`EnvSnapshot`] and the candidate list is a pure function of that
//! snapshot, so ordering is testable without touching the real environment.

use mg_config::{ReloadConfig, ENV_API_URL, ENV_RUNNING_IN_DOCKER};

/// Docker-network aliases the prediction service is commonly published under.
const SERVICE_ALIASES: &[&str] = &["fastapi", "web"];
/// Addresses for reaching a service on the container host from inside a
/// container (Docker Desktop alias, then the default Linux bridge gateway).
const HOST_GATEWAYS: &[&str] = &["host.docker.internal", "172.17.0.1"];
const LOOPBACKS: &[&str] = &["localhost", "127.0.0.1"];

/// Everything candidate discovery is allowed to look at, captured once per
/// notify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// Operator-supplied reload target. Highest priority when present.
    pub override_url: Option<String>,
    /// True when the controller itself runs inside a container.
    pub inside_container: bool,
    /// Port the prediction service listens on (discovery candidates only;
    /// the override URL is used verbatim).
    pub port: u16,
}

impl EnvSnapshot {
    /// Probe the real environment: explicit config override (or `API_URL`),
    /// container marker file, `RUNNING_IN_DOCKER=1`.
    pub fn capture(cfg: &ReloadConfig) -> Self {
        let override_url = cfg
            .api_url
            .clone()
            .or_else(|| std::env::var(ENV_API_URL).ok())
            .filter(|s| !s.trim().is_empty());

        let inside_container = cfg.container_marker.exists()
            || std::env::var(ENV_RUNNING_IN_DOCKER).as_deref() == Ok("1");

        Self {
            override_url,
            inside_container,
            port: cfg.port,
        }
    }
}

/// Ordered, duplicate-free reload candidates for one environment snapshot.
/// First entry is tried first; order encodes reachability priority.
pub fn reload_candidates(snapshot: &EnvSnapshot) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    if let Some(url) = &snapshot.override_url {
        candidates.push(url.trim_end_matches('/').to_string());
    }

    let hosts: Vec<&str> = if snapshot.inside_container {
        SERVICE_ALIASES.iter().chain(HOST_GATEWAYS).copied().collect()
    } else {
        LOOPBACKS.iter().chain(SERVICE_ALIASES).copied().collect()
    };
    for host in hosts {
        candidates.push(format!("http://{}:{}", host, snapshot.port));
    }

    // First-seen-order dedup: an address is never tried twice.
    let mut seen = std::collections::BTreeSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}
