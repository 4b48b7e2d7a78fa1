mod artifacts;
mod config;
mod engine;
mod error;
mod linear;
mod sentiment_engine;
mod server;
mod tfidf;
mod token_pattern;
mod types;

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

use artifacts::ArtifactConfig;
use config::{Config, LogFormat};
use engine::Engine;
use sentiment_engine::SentimentEngine;
use server::AppState;

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sentiment_server=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    tracing::info!("Starting sentiment server with config: {:?}", config);

    if config.artifacts_path.is_none() && config.artifacts_repo.is_none() {
        anyhow::bail!("Either --artifacts-path or --artifacts-repo must be provided");
    }

    let artifact_config = ArtifactConfig::from(&config);
    let files = artifacts::resolve(&artifact_config).await?;

    tracing::info!("Loading vectorizer and classifier...");
    let engine = SentimentEngine::load(&files, config.cpu_only)?;
    tracing::info!(labels = ?engine.labels(), "Artifacts loaded successfully");

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = server::router(AppState::new(Arc::new(engine)))
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());

    axum::serve(listener, app).await?;
    Ok(())
}
