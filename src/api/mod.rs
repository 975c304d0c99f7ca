mod handlers;
mod models;

use axum::{routing::post, Router};

use crate::AppState;

pub use handlers::{ask, not_found, INVALID_QUERY, MODEL_FAILURE};
pub use models::{AskRequest, AskResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .fallback(not_found)
        .with_state(state)
}
