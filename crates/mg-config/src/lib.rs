use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

/// Env var overriding `tracking.uri` (operator-supplied, e.g. in compose).
pub const ENV_TRACKING_URI: &str = "MODELGATE_TRACKING_URI";
/// Env var overriding the reload target (highest-priority reload candidate).
pub const ENV_API_URL: &str = "API_URL";
/// Env var forcing container-context detection on ("1").
pub const ENV_RUNNING_IN_DOCKER: &str = "RUNNING_IN_DOCKER";

/// Top-level configuration for one promotion attempt.
///
/// Loaded once, passed in explicitly — never read from ambient global state,
/// so two attempts with different configs can coexist in one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteConfig {
    pub tracking: TrackingConfig,
    pub thresholds: Vec<ThresholdSpec>,
    #[serde(default)]
    pub reload: ReloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URI of the tracking/registry server, e.g. `http://localhost:5000`.
    pub uri: String,
    /// Experiment name to scan for promotion candidates.
    pub experiment: String,
    /// Registered-model name that receives promoted versions.
    pub model_name: String,
    /// How many most-recent runs to scan for a candidate.
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
}

/// One named metric bound. At least one of `max` / `min` must be set:
/// `max` is an upper bound (observed must be <= max), `min` a lower bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub metric: String,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Explicit reload target override. When set it is the sole first
    /// candidate; discovery heuristics only run when it is absent.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Port the prediction service listens on (discovery candidates only).
    #[serde(default = "default_reload_port")]
    pub port: u16,
    /// Per-attempt request timeout in seconds.
    #[serde(default = "default_reload_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per candidate address.
    #[serde(default = "default_reload_retries")]
    pub retries: u32,
    /// Delay between attempts on the same candidate, in milliseconds.
    #[serde(default = "default_reload_delay_ms")]
    pub delay_ms: u64,
    /// Marker file whose presence means "running inside a container".
    #[serde(default = "default_container_marker")]
    pub container_marker: PathBuf,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            port: default_reload_port(),
            timeout_secs: default_reload_timeout_secs(),
            retries: default_reload_retries(),
            delay_ms: default_reload_delay_ms(),
            container_marker: default_container_marker(),
        }
    }
}

fn default_scan_depth() -> usize {
    5
}
fn default_reload_port() -> u16 {
    8000
}
fn default_reload_timeout_secs() -> u64 {
    5
}
fn default_reload_retries() -> u32 {
    3
}
fn default_reload_delay_ms() -> u64 {
    1000
}
fn default_container_marker() -> PathBuf {
    PathBuf::from("/.dockerenv")
}

impl PromoteConfig {
    /// Resolved tracking URI: env override wins over the config file.
    pub fn tracking_uri(&self) -> String {
        std::env::var(ENV_TRACKING_URI).unwrap_or_else(|_| self.tracking.uri.clone())
    }

    /// Metric names the run selector must require. Derived from the threshold
    /// specs so selection and gating share one source of truth.
    pub fn required_metrics(&self) -> BTreeSet<String> {
        self.thresholds.iter().map(|t| t.metric.clone()).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.tracking.experiment.trim().is_empty() {
            bail!("CONFIG_INVALID: tracking.experiment is empty");
        }
        if self.tracking.model_name.trim().is_empty() {
            bail!("CONFIG_INVALID: tracking.model_name is empty");
        }
        if self.tracking.scan_depth == 0 {
            bail!("CONFIG_INVALID: tracking.scan_depth must be >= 1");
        }
        if self.thresholds.is_empty() {
            bail!("CONFIG_INVALID: at least one threshold is required");
        }
        for t in &self.thresholds {
            if t.metric.trim().is_empty() {
                bail!("CONFIG_INVALID: threshold with empty metric name");
            }
            if t.max.is_none() && t.min.is_none() {
                bail!(
                    "CONFIG_INVALID: threshold for '{}' has neither max nor min",
                    t.metric
                );
            }
        }
        if self.reload.retries == 0 {
            bail!("CONFIG_INVALID: reload.retries must be >= 1");
        }
        Ok(())
    }
}

/// A validated config plus the hash of its canonical JSON form.
///
/// The hash goes into logs so an operator can tell exactly which config a
/// promotion attempt ran with.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PromoteConfig,
    pub config_hash: String,
}

pub fn load_config(path: &str) -> Result<LoadedConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    load_config_from_str(&raw)
}

pub fn load_config_from_str(raw: &str) -> Result<LoadedConfig> {
    let config: PromoteConfig = serde_yaml::from_str(raw).context("invalid config yaml")?;
    config.validate()?;

    let canonical = serde_json::to_string(&config).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical.as_bytes());

    Ok(LoadedConfig {
        config,
        config_hash,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
