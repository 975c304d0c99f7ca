use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::gemini::ModelError;
use crate::AppState;

use super::models::{AskRequest, AskResponse};

pub const INVALID_QUERY: &str = "Invalid query";
pub const MODEL_FAILURE: &str = "Model request failed";

pub async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, (StatusCode, Json<AskResponse>)> {
    let Json(AskRequest { query }) = payload.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "rejected /ask body");
        (StatusCode::BAD_REQUEST, Json(AskResponse::new(INVALID_QUERY)))
    })?;

    info!(query_len = query.len(), "forwarding query to model");

    let answer = timeout(state.timeout, state.client.generate(&query))
        .await
        .unwrap_or(Err(ModelError::Timeout(state.timeout)))
        .map_err(|err| {
            error!(error = %err, "model call failed");
            (StatusCode::BAD_GATEWAY, Json(AskResponse::new(MODEL_FAILURE)))
        })?;

    Ok(Json(AskResponse::new(answer)))
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(AskResponse::new("Not found"))).into_response()
}
