use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    // Short timeout so the healthcheck answers even if the store hangs.
    let store_ok = match tokio::time::timeout(Duration::from_secs(3), state.store.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Health check store ping failed");
            false
        }
        Err(_) => {
            tracing::error!("Health check store ping timed out (3s)");
            false
        }
    };

    let status = if store_ok { "ok" } else { "degraded" };
    Json(json!({
        "code": 200,
        "message": "OK",
        "data": {
            "status": status,
            "now": Utc::now().to_rfc3339(),
            "storage": state.config.storage_backend.as_str(),
            "store": store_ok
        }
    }))
}
