use mg_config::{PromoteConfig, ReloadConfig, ThresholdSpec, TrackingConfig};
use mg_promotion::{PromotionController, PromotionOutcome};
use mg_testkit::{InMemoryRegistry, InMemoryRunStore, ScriptedReloadSignal};

fn config() -> PromoteConfig {
    PromoteConfig {
        tracking: TrackingConfig {
            uri: "http://unused".into(),
            experiment: "energy".into(),
            model_name: "energy_model".into(),
            scan_depth: 5,
        },
        thresholds: vec![
            ThresholdSpec {
                metric: "mae_val".into(),
                max: Some(3.0),
                min: None,
            },
            ThresholdSpec {
                metric: "r2_val".into(),
                max: None,
                min: Some(0.8),
            },
        ],
        reload: ReloadConfig::default(),
    }
}

#[tokio::test]
async fn rejects_and_reports_observed_values() {
    let store = InMemoryRunStore::new()
        .with_experiment("energy", "1")
        .with_run("1", "bad", 100, &[("mae_val", 5.0), ("r2_val", 0.9)]);
    let registry = InMemoryRegistry::new();
    let reload = ScriptedReloadSignal::succeeding();
    let cfg = config();

    let outcome = PromotionController::new(&store, &registry, &reload, &cfg)
        .run()
        .await;

    assert_eq!(outcome.status(), "rejected_thresholds");
    assert_eq!(outcome.exit_code(), 2);
    match outcome {
        PromotionOutcome::RejectedThresholds { gate } => {
            assert!(!gate.passed);
            // The exact evaluated number is reported so an operator can act.
            let mae = gate.checks.iter().find(|c| c.metric == "mae_val").unwrap();
            assert_eq!(mae.observed, Some(5.0));
            assert!(gate.fail_reasons[0].contains("5.000000"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // Nothing was registered or promoted, and no reload was attempted.
    assert!(registry.versions("energy_model").is_empty());
    assert_eq!(reload.calls(), 0);
}

#[tokio::test]
async fn sentinel_metrics_are_selected_then_gated_out() {
    // An unset error recorded as a huge default passes selection (the metric
    // key is present) and must be stopped here, not in the selector.
    let store = InMemoryRunStore::new()
        .with_experiment("energy", "1")
        .with_run("1", "sentinel", 100, &[("mae_val", 999_999.0), ("r2_val", -999.0)]);
    let registry = InMemoryRegistry::new();
    let reload = ScriptedReloadSignal::succeeding();
    let cfg = config();

    let outcome = PromotionController::new(&store, &registry, &reload, &cfg)
        .run()
        .await;

    assert_eq!(outcome.status(), "rejected_thresholds");
    assert!(registry.versions("energy_model").is_empty());
}
