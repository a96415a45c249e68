//! Image generation backends.

mod inference;
mod queued;

pub use inference::InferenceBackend;
pub use queued::{QueueBackend, QueueInputs};

use crate::error::ProxyError;
use crate::images::GeneratedImage;
use crate::transport::upstream_error_message;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Read an image response, turning non-2xx and JSON answers into errors.
pub(crate) async fn read_image_response(
    response: reqwest::Response,
) -> Result<GeneratedImage, ProxyError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProxyError::BackendUnavailable(format!("Failed to read image: {err}")))?;

    if !status.is_success() {
        return Err(ProxyError::Backend {
            status: status.as_u16(),
            message: upstream_error_message(&bytes),
        });
    }
    if content_type.starts_with("application/json") || content_type.starts_with("text/") {
        return Err(ProxyError::Backend {
            status: 502,
            message: format!(
                "expected image bytes, got {content_type}: {}",
                upstream_error_message(&bytes)
            ),
        });
    }
    if bytes.is_empty() {
        return Err(ProxyError::Backend {
            status: 502,
            message: "backend returned an empty image".to_string(),
        });
    }

    Ok(GeneratedImage {
        bytes,
        content_type,
    })
}
