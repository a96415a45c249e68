use std::future::Future;

use http::HeaderMap;

use super::read_image_response;
use crate::error::ProxyError;
use crate::images::{BackendParameters, GeneratedImage, ImageBackend};
use crate::transport::HttpTransport;

/// Synchronous text-to-image endpoint: `POST {base}/models/{model}`.
pub struct InferenceBackend<'a> {
    transport: &'a HttpTransport,
    url: String,
    headers: HeaderMap,
}

impl<'a> InferenceBackend<'a> {
    /// `headers` are the already sanitized headers forwarded with every call.
    #[must_use]
    pub fn new(
        transport: &'a HttpTransport,
        base_url: &str,
        model: &str,
        mut headers: HeaderMap,
    ) -> Self {
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        headers.insert(http::header::ACCEPT, http::HeaderValue::from_static("image/*"));
        Self {
            transport,
            url: format!(
                "{}/models/{}",
                base_url.trim_end_matches('/'),
                model.trim_start_matches('/')
            ),
            headers,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ImageBackend for InferenceBackend<'_> {
    fn generate(
        &self,
        params: BackendParameters,
    ) -> impl Future<Output = Result<GeneratedImage, ProxyError>> + Send {
        async move {
            let body = serde_json::to_vec(&params).map_err(|err| {
                ProxyError::Internal(format!("Failed to encode generation request: {err}"))
            })?;
            let response = self
                .transport
                .send_request(&self.url, http::Method::POST, &self.headers, body.into())
                .await?;
            read_image_response(response).await
        }
    }
}
