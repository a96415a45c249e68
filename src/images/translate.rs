use http::header::HeaderName;
use http::HeaderMap;

use super::{
    BackendParameters, GenerationParameters, ImageGenerationRequest, DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
use crate::error::ProxyError;

const GUIDANCE_SCALE: HeaderName = HeaderName::from_static("guidance_scale");
const NEGATIVE_PROMPT: HeaderName = HeaderName::from_static("negative_prompt");
const NUM_INFERENCE_STEPS: HeaderName = HeaderName::from_static("num_inference_steps");
const SCHEDULER: HeaderName = HeaderName::from_static("scheduler");
const SEED: HeaderName = HeaderName::from_static("seed");

/// Per-request generation overrides, as raw strings taken from headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOverrides {
    pub guidance_scale: Option<String>,
    pub negative_prompt: Option<String>,
    pub num_inference_steps: Option<String>,
    pub scheduler: Option<String>,
    pub seed: Option<String>,
}

impl ImageOverrides {
    /// Remove the override headers from `headers` and collect their values.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Validation`] when an override header is not valid UTF-8.
    pub fn take_from_headers(headers: &mut HeaderMap) -> Result<Self, ProxyError> {
        let mut take = |name: HeaderName| -> Result<Option<String>, ProxyError> {
            let Some(value) = headers.remove(&name) else {
                return Ok(None);
            };
            value
                .to_str()
                .map(|v| Some(v.trim().to_string()))
                .map_err(|_| ProxyError::Validation(format!("header '{name}' is not valid UTF-8")))
        };

        Ok(Self {
            guidance_scale: take(GUIDANCE_SCALE)?,
            negative_prompt: take(NEGATIVE_PROMPT)?,
            num_inference_steps: take(NUM_INFERENCE_STEPS)?,
            scheduler: take(SCHEDULER)?,
            seed: take(SEED)?,
        })
    }
}

/// Parse `"<width>x<height>"`. Anything else yields `(None, None)`.
#[must_use]
pub fn parse_size(size: &str) -> (Option<u32>, Option<u32>) {
    fn dimension(part: &str) -> Option<u32> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse::<u32>().ok().filter(|value| *value > 0)
    }

    let mut parts = size.split('x');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(width), Some(height), None) => match (dimension(width), dimension(height)) {
            (Some(width), Some(height)) => (Some(width), Some(height)),
            _ => (None, None),
        },
        _ => (None, None),
    }
}

/// Reject image counts outside `1..=max`.
///
/// # Errors
///
/// Returns [`ProxyError::Validation`] for a zero count or a count above `max`.
pub fn validate_count(count: u32, max: u32) -> Result<(), ProxyError> {
    if count == 0 {
        return Err(ProxyError::Validation("n must be at least 1".into()));
    }
    if count > max {
        return Err(ProxyError::Validation(format!(
            "n must be at most {max}, got {count}"
        )));
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(
    name: &str,
    raw: Option<&str>,
) -> Result<Option<T>, ProxyError> {
    raw.map(|value| {
        value.parse::<T>().map_err(|_| {
            ProxyError::Validation(format!("override '{name}' has invalid value '{value}'"))
        })
    })
    .transpose()
}

/// Map an OpenAI image request plus overrides onto backend parameters.
///
/// # Errors
///
/// Returns [`ProxyError::Validation`] for an empty prompt or a malformed
/// numeric override.
pub fn translate(
    request: &ImageGenerationRequest,
    overrides: &ImageOverrides,
) -> Result<BackendParameters, ProxyError> {
    if request.prompt.trim().is_empty() {
        return Err(ProxyError::Validation("prompt must not be empty".into()));
    }

    let (width, height) = match request.size.as_deref().map(parse_size) {
        Some((Some(width), Some(height))) => (width, height),
        _ => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
    };

    let guidance_scale =
        parse_override::<f64>("guidance_scale", overrides.guidance_scale.as_deref())?;
    if guidance_scale.is_some_and(|value| !value.is_finite()) {
        return Err(ProxyError::Validation(
            "override 'guidance_scale' must be a finite number".into(),
        ));
    }

    Ok(BackendParameters {
        inputs: request.prompt.clone(),
        parameters: GenerationParameters {
            width,
            height,
            guidance_scale,
            negative_prompt: overrides.negative_prompt.clone(),
            num_inference_steps: parse_override(
                "num_inference_steps",
                overrides.num_inference_steps.as_deref(),
            )?,
            scheduler: overrides.scheduler.clone(),
            seed: parse_override("seed", overrides.seed.as_deref())?,
        },
    })
}
