//! Run-history store access.
//!
//! The training stage records completed runs (metrics + artifact location) in
//! a tracking server. This crate exposes the read-only slice of that server
//! the promotion controller needs: resolve an experiment by name and list its
//! most recent runs.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One completed training run. Immutable; produced by the training stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    /// Metric name -> last recorded value.
    pub metrics: BTreeMap<String, f64>,
    pub artifact_uri: String,
}

impl Run {
    /// Artifact reference for the trained model inside this run.
    pub fn model_source(&self) -> String {
        format!("runs:/{}/model", self.run_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
}

/// Read-only run store interface.
///
/// `find_runs` must return runs most-recent-first; callers rely on that order
/// for bounded recency scans.
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    async fn find_experiment(&self, name: &str) -> Result<Option<Experiment>>;

    async fn find_runs(&self, experiment_id: &str, limit: usize) -> Result<Vec<Run>>;
}

/// Tracking client speaking the MLflow REST surface.
#[derive(Debug, Clone)]
pub struct HttpTrackingClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTrackingClient {
    pub fn new(base_url: String) -> Result<Self> {
        Self::new_with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn new_with_timeout(base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("tracking http client build failed")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }
}

#[async_trait::async_trait]
impl RunStore for HttpTrackingClient {
    async fn find_experiment(&self, name: &str) -> Result<Option<Experiment>> {
        let resp = self
            .http
            .get(self.api("experiments/get-by-name"))
            .query(&[("experiment_name", name)])
            .send()
            .await
            .context("experiment lookup request failed")?;

        let status = resp.status();
        if status.is_success() {
            let body: GetExperimentResponse = resp
                .json()
                .await
                .context("experiment response decode failed")?;
            return Ok(Some(body.experiment));
        }

        let err: ApiError = resp.json().await.unwrap_or_default();
        if err.is_not_found() {
            return Ok(None);
        }
        Err(anyhow!(
            "tracking server error status={} code={} message={}",
            status.as_u16(),
            err.error_code,
            err.message
        ))
    }

    async fn find_runs(&self, experiment_id: &str, limit: usize) -> Result<Vec<Run>> {
        let req = SearchRunsRequest {
            experiment_ids: vec![experiment_id.to_string()],
            order_by: vec!["attributes.start_time DESC".to_string()],
            max_results: limit as i64,
        };

        let resp = self
            .http
            .post(self.api("runs/search"))
            .json(&req)
            .send()
            .await
            .context("run search request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let err: ApiError = resp.json().await.unwrap_or_default();
            return Err(anyhow!(
                "run search error status={} code={} message={}",
                status.as_u16(),
                err.error_code,
                err.message
            ));
        }

        let body: SearchRunsResponse =
            resp.json().await.context("run search decode failed")?;

        body.runs
            .unwrap_or_default()
            .into_iter()
            .map(RunDto::into_run)
            .collect()
    }
}

// -----------------
// Wire DTOs
// -----------------

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Debug, Serialize)]
struct SearchRunsRequest {
    experiment_ids: Vec<String>,
    order_by: Vec<String>,
    max_results: i64,
}

#[derive(Debug, Deserialize)]
struct SearchRunsResponse {
    runs: Option<Vec<RunDto>>,
}

#[derive(Debug, Deserialize)]
struct RunDto {
    info: RunInfoDto,
    #[serde(default)]
    data: RunDataDto,
}

#[derive(Debug, Deserialize)]
struct RunInfoDto {
    run_id: String,
    /// Epoch milliseconds.
    start_time: i64,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct RunDataDto {
    #[serde(default)]
    metrics: Vec<MetricDto>,
}

#[derive(Debug, Deserialize)]
struct MetricDto {
    key: String,
    value: f64,
}

impl RunDto {
    fn into_run(self) -> Result<Run> {
        let start_time = Utc
            .timestamp_millis_opt(self.info.start_time)
            .single()
            .ok_or_else(|| {
                anyhow!(
                    "run {} has invalid start_time {}",
                    self.info.run_id,
                    self.info.start_time
                )
            })?;

        let metrics = self
            .data
            .metrics
            .into_iter()
            .map(|m| (m.key, m.value))
            .collect();

        Ok(Run {
            run_id: self.info.run_id,
            start_time,
            metrics,
            artifact_uri: self.info.artifact_uri,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

impl ApiError {
    fn is_not_found(&self) -> bool {
        self.error_code == "RESOURCE_DOES_NOT_EXIST"
    }
}

// -----------------
// Tests (httpmock, no real server)
// -----------------
