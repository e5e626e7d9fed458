use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ans_registry::configs::AppConfig;
use ans_registry::webserver;

#[tokio::main]
async fn main() -> Result<()> {
    fs::create_dir_all("logs").context("Failed to create logs directory")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "ans-registry.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ans_registry=info,audit=info,axum=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .init();

    info!("Starting Agent Name Service");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("config.toml not loaded ({e:#}); using built-in defaults");
            AppConfig::default()
        }
    };

    // Startup order: CA before RA before registry, registry before HTTP.
    let context = webserver::build_context(config)
        .map_err(|e| anyhow::anyhow!("failed to initialize service: {e}"))?;

    webserver::serve(Arc::new(context)).await
}
