use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode};

use crate::error::ProxyError;
use crate::state::AppState;

/// `GET /tmp/{id}`: serve a cached image with its stored content type.
pub async fn handler(state: &AppState, id: &str) -> Response {
    match state.cache.fetch(id).await {
        Ok(Some(image)) => {
            let content_type = HeaderValue::from_str(&image.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            (
                StatusCode::OK,
                [(http::header::CONTENT_TYPE, content_type)],
                Body::from(image.bytes),
            )
                .into_response()
        }
        Ok(None) => ProxyError::NotFound.into_response(),
        Err(err) => {
            tracing::error!(id, error = %err, "cached image lookup failed");
            err.into_response()
        }
    }
}
