use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use weather_ask_service::{build_app, run_server, AppConfig, AppState, GeminiClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let client = GeminiClient::from_config(&config).context("failed to build model client")?;

    tracing::info!(model = %config.model, timeout = ?config.timeout, "model client ready");

    let app = build_app(AppState::new(Arc::new(client), config.timeout));
    run_server(app, config.socket_addr())
        .await
        .context("server failed")
}
