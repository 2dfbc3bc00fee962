//! Idempotent registration and the promote-to-live transition.

use mg_registry::{ModelRegistry, ModelVersion, RegistryError, Stage};
use tracing::{info, warn};

pub struct ModelRegistrar<'a> {
    registry: &'a dyn ModelRegistry,
    model_name: &'a str,
}

impl<'a> ModelRegistrar<'a> {
    pub fn new(registry: &'a dyn ModelRegistry, model_name: &'a str) -> Self {
        Self {
            registry,
            model_name,
        }
    }

    async fn resolve_by_source(
        &self,
        source: &str,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        let versions = self.registry.get_versions(self.model_name, None).await?;
        // Highest version wins if the same source was registered more than once.
        Ok(versions
            .into_iter()
            .filter(|v| v.source == source)
            .max_by_key(|v| v.version.parse::<u64>().unwrap_or(0)))
    }

    /// Register `source` as a version of the model. Idempotent over
    /// (model name, source): an existing version is returned as-is, and a
    /// transient already-exists response from the store is absorbed by
    /// re-resolving once instead of propagating.
    pub async fn register(
        &self,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, RegistryError> {
        if let Some(existing) = self.resolve_by_source(source).await? {
            info!(
                model = self.model_name,
                version = %existing.version,
                source,
                "artifact already registered, reusing version"
            );
            return Ok(existing);
        }

        match self.registry.create_version(self.model_name, source, run_id).await {
            Ok(version) => {
                info!(
                    model = self.model_name,
                    version = %version.version,
                    source,
                    "registered new model version"
                );
                Ok(version)
            }
            Err(RegistryError::AlreadyExists(msg)) => {
                warn!(
                    model = self.model_name,
                    source,
                    msg = %msg,
                    "create reported already-exists, re-resolving"
                );
                self.resolve_by_source(source).await?.ok_or_else(|| {
                    RegistryError::NotFound(format!(
                        "version for source {source} reported existing but not resolvable"
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Move `version` to the live stage, archiving every other live version
    /// of the model. After this returns Ok, exactly one version is live.
    ///
    /// The store's `archive_existing` flag does the transition atomically
    /// where supported; the re-query below converges stores that lack that
    /// primitive (at-least-once archival, never left inconsistent).
    pub async fn promote_to_live(&self, version: &ModelVersion) -> Result<(), RegistryError> {
        let prior_live = self
            .registry
            .get_versions(self.model_name, Some(Stage::Production))
            .await?;
        if !prior_live.is_empty() {
            info!(
                model = self.model_name,
                prior = ?prior_live.iter().map(|v| v.version.clone()).collect::<Vec<_>>(),
                "archiving previously live versions"
            );
        }

        self.registry
            .set_stage(self.model_name, &version.version, Stage::Production, true)
            .await?;

        let live_now = self
            .registry
            .get_versions(self.model_name, Some(Stage::Production))
            .await?;
        for straggler in live_now.iter().filter(|v| v.version != version.version) {
            warn!(
                model = self.model_name,
                version = %straggler.version,
                "version still live after transition, archiving explicitly"
            );
            self.registry
                .set_stage(self.model_name, &straggler.version, Stage::Archived, false)
                .await?;
        }

        info!(
            model = self.model_name,
            version = %version.version,
            "promoted to live"
        );
        Ok(())
    }
}
