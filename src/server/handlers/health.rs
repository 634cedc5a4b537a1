use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let engine_up = state.engine.health_check().await.unwrap_or(false);
    Json(json!({
        "status": "ok",
        "engine": if engine_up { "reachable" } else { "unreachable" },
    }))
}
