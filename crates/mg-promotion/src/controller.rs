//! Promotion controller: select → gate → register → promote → notify.
//!
//! The flow is strictly linear. Everything up to and including the
//! promote-transition is a hard failure path; once the transition has
//! committed, a failed or cancelled reload notification only degrades the
//! outcome, it never fails the run — the model is live regardless.

use serde::Serialize;
use std::future::Future;
use tokio::time::Instant;
use tracing::{error, info, warn};

use mg_config::PromoteConfig;
use mg_notify::ReloadSignal;
use mg_registry::ModelRegistry;
use mg_tracking::RunStore;

use crate::gate::{bounds_from_specs, evaluate_gate, GateReport};
use crate::registrar::ModelRegistrar;
use crate::selector::select_candidate;

/// Final outcome of one promotion attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PromotionOutcome {
    Promoted {
        model: String,
        version: String,
        reload_failed: bool,
        gate: GateReport,
    },
    RejectedThresholds {
        gate: GateReport,
    },
    NoEligibleRun {
        experiment: String,
    },
    RegistryError {
        message: String,
    },
}

impl PromotionOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            PromotionOutcome::Promoted {
                reload_failed: false,
                ..
            } => "promoted",
            PromotionOutcome::Promoted {
                reload_failed: true,
                ..
            } => "promoted_reload_failed",
            PromotionOutcome::RejectedThresholds { .. } => "rejected_thresholds",
            PromotionOutcome::NoEligibleRun { .. } => "no_eligible_run",
            PromotionOutcome::RegistryError { .. } => "registry_error",
        }
    }

    /// Zero only when the model was promoted (reload outcome does not affect
    /// the exit code); distinct non-zero codes per failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            PromotionOutcome::Promoted { .. } => 0,
            PromotionOutcome::RejectedThresholds { .. } => 2,
            PromotionOutcome::NoEligibleRun { .. } => 3,
            PromotionOutcome::RegistryError { .. } => 4,
        }
    }
}

pub struct PromotionController<'a> {
    store: &'a dyn RunStore,
    registry: &'a dyn ModelRegistry,
    reload: &'a dyn ReloadSignal,
    config: &'a PromoteConfig,
}

impl<'a> PromotionController<'a> {
    pub fn new(
        store: &'a dyn RunStore,
        registry: &'a dyn ModelRegistry,
        reload: &'a dyn ReloadSignal,
        config: &'a PromoteConfig,
    ) -> Self {
        Self {
            store,
            registry,
            reload,
            config,
        }
    }

    pub async fn run(&self) -> PromotionOutcome {
        self.run_until(None).await
    }

    /// Run with an optional overall deadline. Expiry before the
    /// promote-transition commits is fatal; expiry while notifying degrades
    /// to `reload_failed = true` — cancellation after commit must not imply
    /// rollback.
    pub async fn run_until(&self, deadline: Option<Instant>) -> PromotionOutcome {
        let experiment = &self.config.tracking.experiment;
        let model_name = &self.config.tracking.model_name;

        // Selecting
        let required = self.config.required_metrics();
        let selected = match bounded(
            deadline,
            select_candidate(
                self.store,
                experiment,
                &required,
                self.config.tracking.scan_depth,
            ),
        )
        .await
        {
            None => return self.deadline_exceeded("selecting"),
            Some(Err(e)) => {
                error!(error = %e, "run store query failed");
                return PromotionOutcome::RegistryError {
                    message: format!("run store query failed: {e:#}"),
                };
            }
            Some(Ok(None)) => {
                return PromotionOutcome::NoEligibleRun {
                    experiment: experiment.clone(),
                }
            }
            Some(Ok(Some(run))) => run,
        };

        // Gating
        let bounds = bounds_from_specs(&self.config.thresholds);
        let gate = evaluate_gate(&bounds, &selected.metrics);
        if !gate.passed {
            warn!(
                run_id = %selected.run_id,
                reasons = ?gate.fail_reasons,
                "thresholds not met, refusing promotion"
            );
            return PromotionOutcome::RejectedThresholds { gate };
        }
        info!(run_id = %selected.run_id, checks = gate.checks.len(), "thresholds passed");

        // Registering + Promoting
        let registrar = ModelRegistrar::new(self.registry, model_name);
        let source = selected.model_source();
        let version = match bounded(deadline, registrar.register(&source, &selected.run_id)).await
        {
            None => return self.deadline_exceeded("registering"),
            Some(Err(e)) => {
                error!(error = %e, "registration failed");
                return PromotionOutcome::RegistryError {
                    message: format!("registration failed: {e}"),
                };
            }
            Some(Ok(v)) => v,
        };

        match bounded(deadline, registrar.promote_to_live(&version)).await {
            None => return self.deadline_exceeded("promoting"),
            Some(Err(e)) => {
                error!(error = %e, "promote transition failed");
                return PromotionOutcome::RegistryError {
                    message: format!("promote transition failed: {e}"),
                };
            }
            Some(Ok(())) => {}
        }

        // Notifying — soft path from here on.
        let reloaded = bounded(deadline, self.reload.notify())
            .await
            .unwrap_or_else(|| {
                warn!("deadline expired during reload notification");
                false
            });
        if !reloaded {
            warn!(
                model = %model_name,
                version = %version.version,
                "model is live but reload was not acknowledged; serving process may be stale"
            );
        }

        PromotionOutcome::Promoted {
            model: model_name.clone(),
            version: version.version,
            reload_failed: !reloaded,
            gate,
        }
    }

    fn deadline_exceeded(&self, phase: &str) -> PromotionOutcome {
        error!(phase, "deadline exceeded before commit");
        PromotionOutcome::RegistryError {
            message: format!("deadline exceeded while {phase}"),
        }
    }
}

/// Await `fut`, bounded by an optional deadline. `None` means the deadline
/// expired first.
async fn bounded<T>(deadline: Option<Instant>, fut: impl Future<Output = T>) -> Option<T> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}
