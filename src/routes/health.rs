use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::requests::SchemaCatalog;
use crate::state::AppState;

/// Liveness plus a cheap catalog probe: reports how many request tables the store exposes.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let probe = state
        .run(|ctx| Ok(SchemaCatalog::new(ctx.store).list_tables()?.len()))
        .await;

    match probe {
        Ok(tables) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "request_tables": tables })),
        ),
        Err(err) => {
            warn!(error = %err.message(), "health probe could not reach the request store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded" })),
            )
        }
    }
}
