//! Candidate selection: newest run carrying every required metric, within a
//! bounded recency window.

use anyhow::Result;
use mg_tracking::{Run, RunStore};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Scan up to `scan_depth` most-recent runs of `experiment` and return the
/// first whose metric map contains every name in `required`. Returns
/// `Ok(None)` when the experiment is missing or the window is exhausted.
/// Read-only; the run store is never mutated.
///
/// A required metric holding a sentinel/default value is still eligible
/// here — rejecting bad numbers is the gate's job, not selection's.
pub async fn select_candidate(
    store: &dyn RunStore,
    experiment: &str,
    required: &BTreeSet<String>,
    scan_depth: usize,
) -> Result<Option<Run>> {
    let Some(exp) = store.find_experiment(experiment).await? else {
        info!(experiment, "experiment not found");
        return Ok(None);
    };

    let runs = store.find_runs(&exp.experiment_id, scan_depth).await?;
    debug!(experiment, scanned = runs.len(), "candidate scan window");

    for run in runs {
        if required.iter().all(|m| run.metrics.contains_key(m)) {
            info!(run_id = %run.run_id, "selected promotion candidate");
            return Ok(Some(run));
        }
        debug!(run_id = %run.run_id, "run missing required metrics, skipping");
    }

    info!(experiment, scan_depth, "no eligible run in scan window");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_testkit::InMemoryRunStore;

    fn required() -> BTreeSet<String> {
        ["mae_val", "r2_val"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn picks_newest_run_with_all_metrics() {
        let store = InMemoryRunStore::new()
            .with_experiment("energy", "1")
            .with_run("1", "old", 100, &[("mae_val", 2.0), ("r2_val", 0.9)])
            .with_run("1", "new", 200, &[("mae_val", 1.5), ("r2_val", 0.92)]);

        let run = select_candidate(&store, "energy", &required(), 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.run_id, "new");
    }

    #[tokio::test]
    async fn skips_runs_with_partial_metrics() {
        let store = InMemoryRunStore::new()
            .with_experiment("energy", "1")
            .with_run("1", "complete", 100, &[("mae_val", 2.0), ("r2_val", 0.9)])
            .with_run("1", "partial", 200, &[("mae_val", 1.0)])
            .with_run("1", "empty", 300, &[]);

        let run = select_candidate(&store, "energy", &required(), 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.run_id, "complete");
    }

    #[tokio::test]
    async fn never_returns_run_missing_a_required_metric() {
        let store = InMemoryRunStore::new()
            .with_experiment("energy", "1")
            .with_run("1", "partial-a", 100, &[("mae_val", 1.0)])
            .with_run("1", "partial-b", 200, &[("r2_val", 0.9)]);

        assert!(select_candidate(&store, "energy", &required(), 5)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_experiment_yields_none() {
        let store = InMemoryRunStore::new();
        assert!(select_candidate(&store, "ghost", &required(), 5)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn scan_window_is_bounded() {
        // The only complete run is older than the window allows.
        let mut store = InMemoryRunStore::new().with_experiment("energy", "1");
        store = store.with_run("1", "eligible", 0, &[("mae_val", 1.0), ("r2_val", 0.9)]);
        for i in 1..=5 {
            store = store.with_run("1", &format!("partial-{i}"), i * 100, &[("mae_val", 1.0)]);
        }

        assert!(select_candidate(&store, "energy", &required(), 5)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn sentinel_metric_values_are_still_eligible() {
        let store = InMemoryRunStore::new()
            .with_experiment("energy", "1")
            .with_run("1", "sentinel", 100, &[("mae_val", 999_999.0), ("r2_val", -999.0)]);

        let run = select_candidate(&store, "energy", &required(), 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.run_id, "sentinel");
    }
}
