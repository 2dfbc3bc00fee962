//! Deterministic in-memory fakes for scenario tests.
//!
//! No network I/O, no randomness beyond fresh run ids. The fakes implement
//! the same traits as the HTTP clients so scenario tests exercise the real
//! controller wiring end to end.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use mg_notify::ReloadSignal;
use mg_registry::{ModelRegistry, ModelVersion, RegistryError, Stage};
use mg_tracking::{Experiment, Run, RunStore};

/// Builder-style in-memory run store. Runs are kept most-recent-first per
/// experiment, matching the tracking server's search order.
#[derive(Default)]
pub struct InMemoryRunStore {
    experiments: BTreeMap<String, String>,
    runs: BTreeMap<String, Vec<Run>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_experiment(mut self, name: &str, experiment_id: &str) -> Self {
        self.experiments
            .insert(name.to_string(), experiment_id.to_string());
        self
    }

    /// Append a run; `start_epoch_secs` orders runs (larger = newer).
    pub fn with_run(
        mut self,
        experiment_id: &str,
        run_id: &str,
        start_epoch_secs: i64,
        metrics: &[(&str, f64)],
    ) -> Self {
        let run = Run {
            run_id: run_id.to_string(),
            start_time: ts(start_epoch_secs),
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            artifact_uri: format!("mem://artifacts/{run_id}"),
        };
        let runs = self.runs.entry(experiment_id.to_string()).or_default();
        runs.push(run);
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        self
    }

}

fn ts(epoch_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch_secs, 0).single().expect("valid ts")
}

#[async_trait::async_trait]
impl RunStore for InMemoryRunStore {
    async fn find_experiment(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self.experiments.get(name).map(|id| Experiment {
            experiment_id: id.clone(),
            name: name.to_string(),
        }))
    }

    async fn find_runs(&self, experiment_id: &str, limit: usize) -> Result<Vec<Run>> {
        Ok(self
            .runs
            .get(experiment_id)
            .map(|r| r.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// In-memory model registry with the same stage semantics as the HTTP store:
/// monotonic version numbers per model, `archive_existing` archives every
/// other live version in the same transition.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
    /// When set, the next `create_version` call fails with `AlreadyExists`
    /// after creating the record, simulating a transient conflict response.
    fail_create_once: AtomicBool,
    /// When set, `set_stage` ignores `archive_existing`, emulating a store
    /// without a native atomic multi-record transition.
    ignore_archive_flag: AtomicBool,
    create_calls: AtomicUsize,
}

#[derive(Default)]
struct RegistryState {
    versions: BTreeMap<String, Vec<ModelVersion>>,
    next_version: BTreeMap<String, u64>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the transient-conflict injection for the next create call.
    pub fn fail_next_create_with_conflict(&self) {
        self.fail_create_once.store(true, Ordering::SeqCst);
    }

    /// Make `set_stage` ignore the `archive_existing` flag from now on.
    pub fn disable_atomic_archive(&self) {
        self.ignore_archive_flag.store(true, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Seed a version directly in a given stage (defensive-recovery tests).
    pub fn seed_version(&self, model: &str, source: &str, run_id: &str, stage: Stage) -> ModelVersion {
        let mut state = self.state.lock().unwrap();
        let n = state.next_version.entry(model.to_string()).or_insert(0);
        *n += 1;
        let version = ModelVersion {
            name: model.to_string(),
            version: n.to_string(),
            source: source.to_string(),
            run_id: run_id.to_string(),
            stage,
        };
        state
            .versions
            .entry(model.to_string())
            .or_default()
            .push(version.clone());
        version
    }

    pub fn versions(&self, model: &str) -> Vec<ModelVersion> {
        self.state
            .lock()
            .unwrap()
            .versions
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    pub fn live_versions(&self, model: &str) -> Vec<ModelVersion> {
        self.versions(model)
            .into_iter()
            .filter(|v| v.stage == Stage::Production)
            .collect()
    }
}

#[async_trait::async_trait]
impl ModelRegistry for InMemoryRegistry {
    async fn create_version(
        &self,
        model: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, RegistryError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        // Transient conflict: the record landed but the response reported a
        // duplicate. Callers must re-resolve instead of creating again.
        if self.fail_create_once.swap(false, Ordering::SeqCst) {
            self.seed_version(model, source, run_id, Stage::None);
            return Err(RegistryError::AlreadyExists(format!(
                "model version for {source} already exists"
            )));
        }

        Ok(self.seed_version(model, source, run_id, Stage::None))
    }

    async fn get_versions(
        &self,
        model: &str,
        stage: Option<Stage>,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        let mut versions = self.versions(model);
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
        let archive_existing =
            archive_existing && !self.ignore_archive_flag.load(Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let versions = state
            .versions
            .get_mut(model)
            .ok_or_else(|| RegistryError::NotFound(format!("model {model}")))?;

        if !versions.iter().any(|v| v.version == version) {
            return Err(RegistryError::NotFound(format!(
                "version {version} of {model}"
            )));
        }

        for v in versions.iter_mut() {
            if v.version == version {
                v.stage = stage;
            } else if archive_existing && v.stage == stage {
                v.stage = Stage::Archived;
            }
        }
        Ok(())
    }
}

/// Scripted reload signal for controller tests.
pub struct ScriptedReloadSignal {
    result: bool,
    calls: AtomicUsize,
}

impl ScriptedReloadSignal {
    pub fn succeeding() -> Self {
        Self {
            result: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReloadSignal for ScriptedReloadSignal {
    async fn notify(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
    }
}

/// Reload signal that never resolves, for deadline tests.
pub struct StalledReloadSignal;

#[async_trait::async_trait]
impl ReloadSignal for StalledReloadSignal {
    async fn notify(&self) -> bool {
        std::future::pending::<()>().await;
        unreachable!()
    }
}
