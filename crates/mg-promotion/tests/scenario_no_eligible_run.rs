use mg_config::{PromoteConfig, ReloadConfig, ThresholdSpec, TrackingConfig};
use mg_promotion::PromotionController;
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
async fn empty_experiment_yields_no_eligible_run() {
    let store = InMemoryRunStore::new().with_experiment("energy", "1");
    let registry = InMemoryRegistry::new();
    let reload = ScriptedReloadSignal::succeeding();
    let cfg = config();

    let outcome = PromotionController::new(&store, &registry, &reload, &cfg)
        .run()
        .await;

    assert_eq!(outcome.status(), "no_eligible_run");
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(reload.calls(), 0);
}

#[tokio::test]
async fn missing_experiment_yields_no_eligible_run() {
    let store = InMemoryRunStore::new();
    let registry = InMemoryRegistry::new();
    let reload = ScriptedReloadSignal::succeeding();
    let cfg = config();

    let outcome = PromotionController::new(&store, &registry, &reload, &cfg)
        .run()
        .await;

    assert_eq!(outcome.status(), "no_eligible_run");
}

#[tokio::test]
async fn only_partial_metric_runs_yields_no_eligible_run() {
    let store = InMemoryRunStore::new()
        .with_experiment("energy", "1")
        .with_run("1", "partial-a", 100, &[("mae_val", 1.0)])
        .with_run("1", "partial-b", 200, &[("r2_val", 0.9)]);
    let registry = InMemoryRegistry::new();
    let reload = ScriptedReloadSignal::succeeding();
    let cfg = config();

    let outcome = PromotionController::new(&store, &registry, &reload, &cfg)
        .run()
        .await;

    assert_eq!(outcome.status(), "no_eligible_run");
    assert!(registry.versions("energy_model").is_empty());
}
