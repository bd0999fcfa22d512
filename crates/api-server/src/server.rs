//! API server — exposes the automation engine over HTTP.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use leadflow_core::config::AppConfig;
use leadflow_engine::AutomationEngine;
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    engine: AutomationEngine,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: AutomationEngine) -> Self {
        Self { config, engine }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            default_daily_limit: self.config.automation.default_daily_limit,
            start_time: Instant::now(),
        };

        Router::new()
            // Campaign registration and read models
            .route("/api/campaigns", post(rest::create_campaign))
            .route(
                "/api/campaigns/:id/prospects",
                post(rest::import_prospects).get(rest::list_prospects),
            )
            .route("/api/campaigns/:id/stats", get(rest::campaign_stats))
            // Automation controls
            .route("/api/automation/start", post(rest::start_automation))
            .route("/api/automation/stop", post(rest::stop_automation))
            // External signals
            .route("/api/prospects/:id/accepted", post(rest::mark_accepted))
            .route("/api/prospects/:id/replied", post(rest::mark_replied))
            .route("/api/inbox", get(rest::inbox))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            // Middleware
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server (blocks until shutdown).
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus metrics exporter on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
