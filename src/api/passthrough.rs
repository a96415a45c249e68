use axum::body::Body;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::HeaderName;
use http::HeaderValue;

use crate::state::AppState;

const X_USE_CACHE: HeaderName = HeaderName::from_static("x-use-cache");
const STRIPPED_BODY_FIELDS: [&str; 2] = ["max_tokens", "max_completion_tokens"];

/// How a pass-through request is reshaped before forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reshape {
    /// Chat completions: disable backend caching and drop token limits.
    Chat,
    /// Anything else: credentials stripped, body untouched.
    Opaque,
}

/// `POST /v1/chat/completions`.
pub async fn chat_handler(
    state: &AppState,
    path_and_query: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    forward(state, path_and_query, headers, body, Reshape::Chat).await
}

/// Catch-all `POST` forwarded to the backend unchanged apart from credentials.
pub async fn catch_all_handler(
    state: &AppState,
    path_and_query: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    forward(state, path_and_query, headers, body, Reshape::Opaque).await
}

async fn forward(
    state: &AppState,
    path_and_query: &str,
    headers: &HeaderMap,
    body: Bytes,
    reshape: Reshape,
) -> Response {
    let url = format!(
        "{}{}",
        state.config.backend.base_url.trim_end_matches('/'),
        path_and_query
    );
    let mut upstream_headers = state.backend_headers(headers);
    let body = match reshape {
        Reshape::Chat => {
            if !upstream_headers.contains_key(&X_USE_CACHE) {
                upstream_headers.insert(X_USE_CACHE, HeaderValue::from_static("false"));
            }
            strip_token_limits(body)
        }
        Reshape::Opaque => body,
    };

    tracing::debug!(url = %url, ?reshape, "forwarding request to backend");
    match state
        .transport
        .send_stream(&url, http::Method::POST, &upstream_headers, body)
        .await
    {
        Ok(response) => stream_response(response),
        Err(err) => {
            tracing::warn!(url = %url, error = %err, "pass-through request failed");
            err.into_response()
        }
    }
}

/// Remove token limit fields from a JSON object body; other bodies pass unchanged.
pub(crate) fn strip_token_limits(body: Bytes) -> Bytes {
    let Ok(serde_json::Value::Object(mut object)) = serde_json::from_slice(&body) else {
        return body;
    };
    let mut removed = false;
    for field in STRIPPED_BODY_FIELDS {
        removed |= object.remove(field).is_some();
    }
    if !removed {
        return body;
    }
    match serde_json::to_vec(&object) {
        Ok(encoded) => Bytes::from(encoded),
        Err(err) => {
            tracing::warn!(error = %err, "failed to re-encode chat body; forwarding original");
            body
        }
    }
}

fn stream_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let content_type = response.headers().get(http::header::CONTENT_TYPE).cloned();
    let cache_control = response.headers().get(http::header::CACHE_CONTROL).cloned();

    let mut passthrough = Response::new(Body::from_stream(response.bytes_stream()));
    *passthrough.status_mut() = status;
    let headers = passthrough.headers_mut();
    if let Some(content_type) = content_type {
        headers.insert(http::header::CONTENT_TYPE, content_type);
    }
    if let Some(cache_control) = cache_control {
        headers.insert(http::header::CACHE_CONTROL, cache_control);
    }
    passthrough
}
