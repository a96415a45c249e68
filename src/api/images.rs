use std::time::Instant;

use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;

use crate::backend::{InferenceBackend, QueueBackend};
use crate::error::ProxyError;
use crate::images::{
    fanout, translate, validate_count, ImageGenerationRequest, ImageOverrides, ImagesResponse,
};
use crate::state::AppState;

/// `POST /v1/images/generations`.
pub async fn handler(
    state: &AppState,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match generate_images(state, uri, headers, &body).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, status = err.status().as_u16(), "image generation request failed");
            err.into_response()
        }
    }
}

async fn generate_images(
    state: &AppState,
    uri: &Uri,
    mut headers: HeaderMap,
    body: &[u8],
) -> Result<ImagesResponse, ProxyError> {
    let overrides = ImageOverrides::take_from_headers(&mut headers)?;
    let request: ImageGenerationRequest = serde_json::from_slice(body)
        .map_err(|err| ProxyError::Validation(format!("Invalid JSON body: {err}")))?;

    let count = request.count();
    validate_count(count, state.config.images.max_images_per_request)?;
    let params = translate(&request, &overrides)?;
    let format = request.format();
    let base_url = state.public_base_url(&headers, uri);

    let model = request
        .model
        .as_deref()
        .filter(|model| !model.is_empty())
        .unwrap_or(state.config.images.default_model.as_str());
    let started = Instant::now();
    tracing::info!(
        model,
        count,
        ?format,
        width = params.parameters.width,
        height = params.parameters.height,
        "image generation started"
    );

    let response = if model == state.config.queue_backend.model {
        let backend = QueueBackend::new(&state.transport, &state.config.queue_backend);
        fanout::generate(&backend, &state.cache, &params, count, format, &base_url).await?
    } else {
        let backend = InferenceBackend::new(
            &state.transport,
            &state.config.backend.base_url,
            model,
            state.backend_headers(&headers),
        );
        fanout::generate(&backend, &state.cache, &params, count, format, &base_url).await?
    };

    tracing::info!(
        model,
        succeeded = response.data.len(),
        failed = response.error_count.unwrap_or(0),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "image generation finished"
    );
    Ok(response)
}
