pub mod api;
pub mod config;
pub mod gemini;
pub mod tools;

use std::{sync::Arc, time::Duration};

use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{AppConfig, ConfigError};
pub use gemini::{GeminiClient, GenerationConfig, ModelClient, ModelError};
pub use tools::{get_current_weather, Tool, Toolbox, WeatherTool};

/// Per-request context handed to the `/ask` handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn ModelClient>,
    pub timeout: Duration,
}

impl AppState {
    pub fn new(client: Arc<dyn ModelClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

pub fn build_app(state: AppState) -> Router {
    api::router(state).layer(TraceLayer::new_for_http())
}

pub async fn run_server(app: Router, addr: impl ToSocketAddrs) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
