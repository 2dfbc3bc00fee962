//! Model registry access.
//!
//! A registered model is a named, versioned pointer into artifact storage.
//! Exactly one version per model name may hold the live (`Production`) stage;
//! the promote-transition in mg-promotion enforces that through this
//! interface. Errors are typed so that "version already exists" — an expected
//! branch of idempotent registration — is distinguishable from real failures.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lifecycle stage of a model version. `Production` is the live slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    None,
    Staging,
    Production,
    Archived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::None => "None",
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        match s {
            "None" => Some(Stage::None),
            "Staging" => Some(Stage::Staging),
            "Production" => Some(Stage::Production),
            "Archived" => Some(Stage::Archived),
            _ => None,
        }
    }
}

/// One version record of a registered model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    /// Registry-assigned, monotonically increasing (kept as string: the wire
    /// format is a string and we never do arithmetic on it).
    pub version: String,
    /// Artifact reference this version points at, e.g. `runs:/<id>/model`.
    pub source: String,
    pub run_id: String,
    pub stage: Stage,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The model or version already exists. Expected during idempotent
    /// registration; callers absorb it by re-resolving the existing record.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Non-2xx response that is not an already-exists/not-found condition.
    #[error("registry error status={status} code={code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Connection failure, timeout, or undecodable response.
    #[error("registry unreachable: {0}")]
    Transport(String),
}

#[async_trait::async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Create a new version of `model` pointing at `source`. The registry
    /// assigns the version number. Fails with `AlreadyExists` if the store
    /// reports a conflicting record.
    async fn create_version(
        &self,
        model: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, RegistryError>;

    /// List versions of `model`, optionally filtered to one stage.
    async fn get_versions(
        &self,
        model: &str,
        stage: Option<Stage>,
    ) -> Result<Vec<ModelVersion>, RegistryError>;

    /// Move `version` of `model` to `stage`. With `archive_existing` the
    /// store archives every other version currently in that stage as part of
    /// the same transition, where it supports doing so atomically.
    async fn set_stage(
        &self,
        model: &str,
        version: &str,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<(), RegistryError>;
}

/// Registry client speaking the MLflow model-registry REST surface.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: String) -> Result<Self, RegistryError> {
        Self::new_with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn new_with_timeout(base_url: String, timeout: Duration) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }

    /// Ensure the registered-model record exists. An already-existing model
    /// is the normal steady state, not an error.
    pub async fn ensure_model(&self, model: &str) -> Result<(), RegistryError> {
        let resp = self
            .http
            .post(self.api("registered-models/create"))
            .json(&serde_json::json!({ "name": model }))
            .send()
            .await
            .map_err(transport)?;

        match check(resp).await {
            Ok(_) | Err(RegistryError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let err: ApiError = resp.json().await.unwrap_or_default();
    match err.error_code.as_str() {
        "RESOURCE_ALREADY_EXISTS" => Err(RegistryError::AlreadyExists(err.message)),
        "RESOURCE_DOES_NOT_EXIST" => Err(RegistryError::NotFound(err.message)),
        _ => Err(RegistryError::Api {
            status: status.as_u16(),
            code: err.error_code,
            message: err.message,
        }),
    }
}

fn transport(e: reqwest::Error) -> RegistryError {
    RegistryError::Transport(e.to_string())
}

#[async_trait::async_trait]
impl ModelRegistry for HttpRegistryClient {
    async fn create_version(
        &self,
        model: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, RegistryError> {
        self.ensure_model(model).await?;

        let resp = self
            .http
            .post(self.api("model-versions/create"))
            .json(&serde_json::json!({
                "name": model,
                "source": source,
                "run_id": run_id,
            }))
            .send()
            .await
            .map_err(transport)?;

        let resp = check(resp).await?;
        let body: ModelVersionResponse = resp
            .json()
            .await
            .map_err(|e| RegistryError::Transport(format!("version decode failed: {e}")))?;
        Ok(body.model_version.into_version())
    }

    async fn get_versions(
        &self,
        model: &str,
        stage: Option<Stage>,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        let filter = format!("name='{model}'");
        let resp = self
            .http
            .get(self.api("model-versions/search"))
            .query(&[("filter", filter.as_str())])
            .send()
            .await
            .map_err(transport)?;

        let resp = check(resp).await?;
        let body: SearchVersionsResponse = resp
            .json()
            .await
            .map_err(|e| RegistryError::Transport(format!("search decode failed: {e}")))?;

        let mut versions: Vec<ModelVersion> = body
            .model_versions
            .unwrap_or_default()
            .into_iter()
            .map(ModelVersionDto::into_version)
            .collect();
        if let Some(stage) = stage {
            versions.retain(|v| v.stage == stage);
        }
        Ok(versions)
    }

    async fn set_stage(
        &self,
        model: &str,
        version: &str,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<(), RegistryError> {
        let resp = self
            .http
            .post(self.api("model-versions/transition-stage"))
            .json(&serde_json::json!({
                "name": model,
                "version": version,
                "stage": stage.as_str(),
                "archive_existing_versions": archive_existing,
            }))
            .send()
            .await
            .map_err(transport)?;

        check(resp).await?;
        Ok(())
    }
}

// -----------------
// Wire DTOs
// -----------------

#[derive(Debug, Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersionDto,
}

#[derive(Debug, Deserialize)]
struct SearchVersionsResponse {
    model_versions: Option<Vec<ModelVersionDto>>,
}

#[derive(Debug, Deserialize)]
struct ModelVersionDto {
    name: String,
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    run_id: String,
    #[serde(default)]
    current_stage: String,
}

impl ModelVersionDto {
    fn into_version(self) -> ModelVersion {
        ModelVersion {
            name: self.name,
            version: self.version,
            source: self.source,
            run_id: self.run_id,
            // Unknown stage strings are treated as unstaged.
            stage: Stage::parse(&self.current_stage).unwrap_or(Stage::None),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

// -----------------
// Tests (httpmock, no real server)
// -----------------

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn version_body(version: &str, stage: &str) -> serde_json::Value {
        serde_json::json!({
            "model_version": {
                "name": "m",
                "version": version,
                "source": "runs:/abc/model",
                "run_id": "abc",
                "current_stage": stage
            }
        })
    }

    #[tokio::test]
    async fn create_version_round_trips() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/2.0/mlflow/registered-models/create");
            then.status(400).json_body(serde_json::json!({
                "error_code": "RESOURCE_ALREADY_EXISTS",
                "message": "model m exists"
            }));
        });
        let create = server.mock(|when, then| {
            when.method(POST).path("/api/2.0/mlflow/model-versions/create");
            then.status(200).json_body(version_body("3", "None"));
        });

        let client = HttpRegistryClient::new(server.base_url()).unwrap();
        let v = client
            .create_version("m", "runs:/abc/model", "abc")
            .await
            .unwrap();
        assert_eq!(v.version, "3");
        assert_eq!(v.stage, Stage::None);
        create.assert();
    }

    #[tokio::test]
    async fn already_exists_is_typed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/2.0/mlflow/registered-models/create");
            then.status(200).json_body(serde_json::json!({"registered_model": {"name": "m"}}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/2.0/mlflow/model-versions/create");
            then.status(400).json_body(serde_json::json!({
                "error_code": "RESOURCE_ALREADY_EXISTS",
                "message": "version exists"
            }));
        });

        let client = HttpRegistryClient::new(server.base_url()).unwrap();
        let err = client
            .create_version("m", "runs:/abc/model", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn search_filters_by_stage() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/2.0/mlflow/model-versions/search")
                .query_param("filter", "name='m'");
            then.status(200).json_body(serde_json::json!({
                "model_versions": [
                    {"name": "m", "version": "1", "current_stage": "Archived"},
                    {"name": "m", "version": "2", "current_stage": "Production"}
                ]
            }));
        });

        let client = HttpRegistryClient::new(server.base_url()).unwrap();
        let live = client
            .get_versions("m", Some(Stage::Production))
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].version, "2");
    }

    #[tokio::test]
    async fn transition_stage_posts_archive_flag() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/2.0/mlflow/model-versions/transition-stage")
                .json_body_partial(r#"{"stage": "Production", "archive_existing_versions": true}"#);
            then.status(200).json_body(version_body("3", "Production"));
        });

        let client = HttpRegistryClient::new(server.base_url()).unwrap();
        client
            .set_stage("m", "3", Stage::Production, true)
            .await
            .unwrap();
        mock.assert();
    }
}
