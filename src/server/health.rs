use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Instant;
use tracing::warn;

use super::AppState;
use crate::engine::{compose, ResponseMeta, ResponseShape};
use crate::error::EngineError;

/// GET /health - database connectivity check
pub async fn health(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    match state.executor.backend().ping().await {
        Ok(()) => {
            let data = json!({
                "status": "healthy",
                "database": "connected",
                "latency_ms": start.elapsed().as_millis() as u64,
                "routes": state.table.len(),
            });
            let body = compose(
                Some(data),
                &ResponseShape::default(),
                None,
                ResponseMeta::now(),
            );
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(failure) => {
            warn!(error = %failure, "health check failed");
            EngineError::Unavailable(format!("database check failed: {}", failure.message))
                .into_response()
        }
    }
}
