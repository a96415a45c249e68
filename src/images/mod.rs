//! OpenAI-compatible image generation: request types, parameter translation
//! and parallel fan-out.

pub mod fanout;
pub mod translate;

pub use fanout::{generate, ImageBackend};
pub use translate::{parse_size, translate, validate_count, ImageOverrides};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;

/// How generated images are returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Url,
    B64Json,
}

/// Body of `POST /v1/images/generations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ImageGenerationRequest {
    #[must_use]
    pub fn count(&self) -> u32 {
        self.n.unwrap_or(1)
    }

    #[must_use]
    pub fn format(&self) -> ResponseFormat {
        self.response_format.unwrap_or_default()
    }
}

/// Backend-native generation parameters; optional fields are omitted when unset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParameters {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_inference_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Payload of one backend generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendParameters {
    pub inputs: String,
    pub parameters: GenerationParameters,
}

impl BackendParameters {
    /// Parameters for fan-out call `index`: the seed, when present, is offset by the index.
    #[must_use]
    pub fn for_call(&self, index: u32) -> Self {
        let mut params = self.clone();
        params.parameters.seed = params
            .parameters
            .seed
            .map(|seed| seed.wrapping_add(u64::from(index)));
        params
    }
}

/// Raw output of a successful backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// One entry of the `data` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageData {
    Url { url: String },
    B64Json { b64_json: String },
}

/// Body of a successful image generation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesResponse {
    pub created: u64,
    pub data: Vec<ImageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(seed: Option<u64>) -> BackendParameters {
        BackendParameters {
            inputs: "a cat".into(),
            parameters: GenerationParameters {
                width: 512,
                height: 512,
                guidance_scale: None,
                negative_prompt: None,
                num_inference_steps: None,
                scheduler: None,
                seed,
            },
        }
    }

    #[test]
    fn test_for_call_offsets_seed() {
        let base = params(Some(100));
        assert_eq!(base.for_call(0).parameters.seed, Some(100));
        assert_eq!(base.for_call(2).parameters.seed, Some(102));
        assert_eq!(params(None).for_call(3).parameters.seed, None);
        assert_eq!(params(Some(u64::MAX)).for_call(1).parameters.seed, Some(0));
    }

    #[test]
    fn test_backend_parameters_omit_unset_fields() {
        let json = serde_json::to_value(params(None)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"inputs": "a cat", "parameters": {"width": 512, "height": 512}})
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: ImageGenerationRequest =
            serde_json::from_str(r#"{"prompt":"x","n":null,"response_format":null}"#).unwrap();
        assert_eq!(request.count(), 1);
        assert_eq!(request.format(), ResponseFormat::Url);

        let request: ImageGenerationRequest =
            serde_json::from_str(r#"{"prompt":"x","response_format":"b64_json","n":3}"#).unwrap();
        assert_eq!(request.count(), 3);
        assert_eq!(request.format(), ResponseFormat::B64Json);
    }

    #[test]
    fn test_response_omits_partial_metadata_when_absent() {
        let response = ImagesResponse {
            created: 1,
            data: vec![ImageData::Url {
                url: "http://h/tmp/x".into(),
            }],
            partial_failure: None,
            error_count: None,
            success_count: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"created": 1, "data": [{"url": "http://h/tmp/x"}]})
        );
    }
}
