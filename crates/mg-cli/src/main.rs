//! modelgate entry point.
//!
//! Thin wiring only: parse args, load config, build the HTTP clients and the
//! notifier, run the promotion controller, print the outcome as JSON, and
//! exit with the outcome's code.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use mg_config::LoadedConfig;
use mg_notify::{
    reload_candidates, EnvSnapshot, HttpReloadTransport, ReloadNotifier, RetryPolicy,
};
use mg_promotion::{PromotionController, PromotionOutcome};
use mg_registry::HttpRegistryClient;
use mg_tracking::HttpTrackingClient;

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(about = "Model promotion + serving reload controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Promote the latest passing run to the live stage and notify serving.
    Promote {
        /// Path to the promotion config yaml.
        #[arg(long, default_value = "config.yaml")]
        config: String,

        /// Explicit reload target, overriding config and discovery.
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Print the canonical config hash.
    ConfigHash {
        #[arg(long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent when absent.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Promote { config, api_url } => {
            let outcome = run_promote(&config, api_url).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "status": outcome.status(),
                    "detail": outcome,
                }))?
            );
            std::process::exit(outcome.exit_code());
        }
        Commands::ConfigHash { config } => {
            let loaded = mg_config::load_config(&config)?;
            println!("{}", loaded.config_hash);
            Ok(())
        }
    }
}

async fn run_promote(config_path: &str, api_url: Option<String>) -> Result<PromotionOutcome> {
    let LoadedConfig {
        mut config,
        config_hash,
    } = mg_config::load_config(config_path)?;
    if api_url.is_some() {
        config.reload.api_url = api_url;
    }
    info!(config_hash = %config_hash, experiment = %config.tracking.experiment, "config loaded");

    let tracking_uri = config.tracking_uri();
    let store =
        HttpTrackingClient::new(tracking_uri.clone()).context("tracking client build failed")?;
    let registry =
        HttpRegistryClient::new(tracking_uri).context("registry client build failed")?;

    let snapshot = EnvSnapshot::capture(&config.reload);
    let candidates = reload_candidates(&snapshot);
    info!(?candidates, inside_container = snapshot.inside_container, "reload candidates");

    let transport = HttpReloadTransport::new(Duration::from_secs(config.reload.timeout_secs))
        .context("reload transport build failed")?;
    let policy = RetryPolicy::new(
        config.reload.retries,
        Duration::from_millis(config.reload.delay_ms),
    );
    let notifier = ReloadNotifier::new(transport, policy, candidates);

    let controller = PromotionController::new(&store, &registry, &notifier, &config);
    let outcome = controller.run().await;
    info!(status = outcome.status(), "promotion finished");
    Ok(outcome)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
