use anyhow::Context;
use deployment::Deployment;
use server::{DeploymentImpl, routes};
use services::services::config::AppConfig;
use tracing::info;
use tracing_subscriber::{EnvFilter, prelude::*};
use utils::sentry::{init_once as sentry_init_once, sentry_layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().context("invalid configuration")?;

    let _sentry_guard = sentry_init_once(config.sentry_dsn.as_deref(), &config.environment);

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .with(sentry_layer())
        .init();

    let bind_addr = config.bind_addr;
    let deployment = DeploymentImpl::new(config)
        .await
        .context("failed to start deployment")?;

    let app = routes::router(deployment);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
