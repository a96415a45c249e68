use axum::response::Json;
use serde::Serialize;

use crate::state::AppState;

const MAX_CONTEXT_LENGTH: u32 = 131_072;

#[derive(Debug, Serialize)]
struct ModelList<'a> {
    object: &'static str,
    data: [ModelDescriptor<'a>; 1],
}

/// LM Studio style model descriptor.
#[derive(Debug, Serialize)]
struct ModelDescriptor<'a> {
    id: &'a str,
    object: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    publisher: &'static str,
    arch: &'static str,
    compatibility_type: &'static str,
    quantization: &'static str,
    state: &'static str,
    max_context_length: u32,
}

/// Static listing of the configured chat model.
pub fn handler(state: &AppState) -> Json<serde_json::Value> {
    let list = ModelList {
        object: "list",
        data: [ModelDescriptor {
            id: &state.config.backend.chat_model,
            object: "model",
            kind: "vlm",
            publisher: "lmstudio-community",
            arch: "llama",
            compatibility_type: "gguf",
            quantization: "Q4_K_M",
            state: "not-loaded",
            max_context_length: MAX_CONTEXT_LENGTH,
        }],
    };
    Json(serde_json::to_value(list).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_lists_configured_chat_model() {
        let mut config = AppConfig::default();
        config.backend.chat_model = "acme/vision-1".into();
        let state = AppState::new(config);
        let Json(body) = handler(&state);
        assert_eq!(body["object"], "list");
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["id"], "acme/vision-1");
        assert_eq!(data[0]["type"], "vlm");
        assert_eq!(data[0]["max_context_length"], 131_072);
    }
}
