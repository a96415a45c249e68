use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(state: &AppState) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "hfproxy is running",
        "config": {
            "backend_url": config.backend.base_url,
            "chat_model": config.backend.chat_model,
            "queue_model": config.queue_backend.model,
            "images": {
                "default_model": config.images.default_model,
                "max_images_per_request": config.images.max_images_per_request,
            },
            "cache": config.cache.kind.to_string(),
            "log_level": config.features.log_level,
        }
    }))
}
