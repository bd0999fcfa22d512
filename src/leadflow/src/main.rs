//! LeadFlow — outreach automation engine with humanlike scheduling.
//!
//! Main entry point that wires the engine to the HTTP API.

use clap::Parser;
use leadflow_api::ApiServer;
use leadflow_core::config::AppConfig;
use leadflow_engine::{simulated_channel, AutomationEngine, HumanlikeDelayPolicy, ProspectStore};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(about = "Outreach automation engine with humanlike scheduling")]
#[command(version)]
struct Cli {
    /// HTTP port (overrides config)
    #[arg(long, env = "LEADFLOW__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Worker tick interval in milliseconds (overrides config)
    #[arg(long, env = "LEADFLOW__AUTOMATION__TICK_INTERVAL_MS")]
    tick_interval_ms: Option<u64>,

    /// Fixed RNG seed for reproducible scheduling (overrides config)
    #[arg(long, env = "LEADFLOW__AUTOMATION__RNG_SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadflow=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("LeadFlow starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(interval) = cli.tick_interval_ms {
        config.automation.tick_interval_ms = interval;
    }
    if let Some(seed) = cli.seed {
        config.automation.rng_seed = Some(seed);
    }

    info!(
        http_port = config.api.http_port,
        tick_interval_ms = config.automation.tick_interval_ms,
        default_daily_limit = config.automation.default_daily_limit,
        "Configuration loaded"
    );

    // Delay bounds are validated here; a bad window is fatal at startup.
    let policy = match HumanlikeDelayPolicy::from_config(&config.automation) {
        Ok(policy) => Arc::new(policy),
        Err(e) => {
            error!(error = %e, "Invalid automation configuration");
            return Err(e.into());
        }
    };

    let engine = AutomationEngine::new(
        ProspectStore::new(),
        simulated_channel(),
        policy,
        config.automation.clone(),
    );

    // Start API server
    let api_server = ApiServer::new(config, engine);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("LeadFlow is ready");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
