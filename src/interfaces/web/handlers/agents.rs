use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use super::super::AppState;
use crate::core::agents::render_listing;

pub async fn health_endpoint() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_agents(State(state): State<AppState>) -> axum::response::Response {
    match state.tools.list_agents().await {
        Ok(agents) => Json(serde_json::json!({
            "success": true,
            "markdown": render_listing(&agents),
            "agents": agents,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Error listing agents: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "success": false,
                    "error": format!("Error listing agents: {}", e),
                })),
            )
                .into_response()
        }
    }
}
