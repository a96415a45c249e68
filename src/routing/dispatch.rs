use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{files, health, images, models, passthrough};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;
const CACHED_IMAGE_PREFIX: &str = "/tmp/";

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch<'a> {
    Health,
    Models,
    ChatCompletions,
    ImageGenerations,
    CachedImage { id: &'a str },
    Passthrough,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());
    tracing::debug!(method = %parts.method, path = parts.uri.path(), ?route, "dispatching request");

    let response = match route {
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::Models => models::handler(&state).into_response(),
        RouteMatch::ChatCompletions => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            let target = backend_path_and_query(&parts.uri, base_path.as_ref());
            passthrough::chat_handler(&state, &target, &parts.headers, body_bytes).await
        }
        RouteMatch::ImageGenerations => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            images::handler(&state, &parts.uri, parts.headers, body_bytes).await
        }
        RouteMatch::CachedImage { id } => files::handler(&state, id).await,
        RouteMatch::Passthrough => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            let target = backend_path_and_query(&parts.uri, base_path.as_ref());
            passthrough::catch_all_handler(&state, &target, &parts.headers, body_bytes).await
        }
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 2MiB)",
            )
                .into_response()
        })
}

/// Path (without the proxy's base path) and query forwarded to the backend.
fn backend_path_and_query(uri: &http::Uri, base_path: &str) -> String {
    let path = strip_base_path(uri.path(), base_path).unwrap_or("/");
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

fn match_route<'a>(method: &Method, path: &'a str, base_path: &str) -> RouteMatch<'a> {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/v1/models" => {
            if method == Method::GET {
                RouteMatch::Models
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/v1/chat/completions" => {
            if method == Method::POST {
                RouteMatch::ChatCompletions
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/v1/images/generations" => {
            if method == Method::POST {
                RouteMatch::ImageGenerations
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => {
            if method == Method::POST {
                RouteMatch::Passthrough
            } else if let Some(id) = path.strip_prefix(CACHED_IMAGE_PREFIX) {
                if method != Method::GET {
                    RouteMatch::MethodNotAllowed
                } else if id.is_empty() || id.contains('/') {
                    RouteMatch::NotFound
                } else {
                    RouteMatch::CachedImage { id }
                }
            } else {
                RouteMatch::NotFound
            }
        }
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}
