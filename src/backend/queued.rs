use std::future::Future;

use serde::Serialize;

use super::read_image_response;
use crate::config::QueueBackendConfig;
use crate::error::ProxyError;
use crate::images::{BackendParameters, GeneratedImage, ImageBackend};
use crate::queue::QueuePoller;
use crate::transport::HttpTransport;

/// Positional inputs of the queue service's text-to-image function:
/// `[prompt, seed, randomize_seed, width, height, guidance_scale, num_inference_steps]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInputs(pub String, pub u64, pub bool, pub u32, pub u32, pub f64, pub u32);

impl QueueInputs {
    #[must_use]
    pub fn from_params(params: &BackendParameters, config: &QueueBackendConfig) -> Self {
        let p = &params.parameters;
        Self(
            params.inputs.clone(),
            p.seed.unwrap_or(0),
            p.seed.is_none(),
            p.width,
            p.height,
            p.guidance_scale.unwrap_or(config.guidance_scale),
            p.num_inference_steps.unwrap_or(config.num_inference_steps),
        )
    }
}

/// Queue-based backend: join, wait for completion, download the result.
pub struct QueueBackend<'a> {
    transport: &'a HttpTransport,
    config: &'a QueueBackendConfig,
}

impl<'a> QueueBackend<'a> {
    #[must_use]
    pub fn new(transport: &'a HttpTransport, config: &'a QueueBackendConfig) -> Self {
        Self { transport, config }
    }
}

impl ImageBackend for QueueBackend<'_> {
    fn generate(
        &self,
        params: BackendParameters,
    ) -> impl Future<Output = Result<GeneratedImage, ProxyError>> + Send {
        async move {
            if params.parameters.negative_prompt.is_some() || params.parameters.scheduler.is_some()
            {
                tracing::debug!("queue backend ignores negative_prompt and scheduler overrides");
            }
            let inputs = QueueInputs::from_params(&params, self.config);
            let poller =
                QueuePoller::new(self.transport, &self.config.base_url, self.config.fn_index);
            let url = poller.run(&inputs).await?;
            let response = self.transport.get(&url).await?;
            read_image_response(response).await
        }
    }
}
