use std::future::Future;

use base64::Engine as _;
use futures_util::future::join_all;

use super::{BackendParameters, GeneratedImage, ImageData, ImagesResponse, ResponseFormat};
use crate::cache::ImageCache;
use crate::error::ProxyError;
use crate::util::unix_now_secs;

/// A backend able to produce one image per call.
pub trait ImageBackend: Sync {
    fn generate(
        &self,
        params: BackendParameters,
    ) -> impl Future<Output = Result<GeneratedImage, ProxyError>> + Send;
}

async fn render_entry(
    cache: &ImageCache,
    image: GeneratedImage,
    format: ResponseFormat,
    base_url: &str,
) -> Result<ImageData, ProxyError> {
    match format {
        ResponseFormat::B64Json => Ok(ImageData::B64Json {
            b64_json: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
        }),
        ResponseFormat::Url => {
            let id = cache.store(image.bytes, &image.content_type).await?;
            Ok(ImageData::Url {
                url: format!("{}/tmp/{id}", base_url.trim_end_matches('/')),
            })
        }
    }
}

/// Run `count` generation calls concurrently and assemble the response.
///
/// Every call runs to completion; one failure never cancels its siblings.
/// Call `i` uses `seed + i` when a seed is set. Entries keep request order.
///
/// # Errors
///
/// Returns [`ProxyError::AllGenerationsFailed`] with every collected error
/// message when no call succeeds.
pub async fn generate<B: ImageBackend>(
    backend: &B,
    cache: &ImageCache,
    params: &BackendParameters,
    count: u32,
    format: ResponseFormat,
    base_url: &str,
) -> Result<ImagesResponse, ProxyError> {
    let calls = (0..count).map(|index| {
        let call_params = params.for_call(index);
        async move {
            let image = backend.generate(call_params).await?;
            render_entry(cache, image, format, base_url).await
        }
    });
    let outcomes = join_all(calls).await;

    let mut data = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(entry) => data.push(entry),
            Err(err) => {
                tracing::warn!(index, error = %err, "image generation call failed");
                errors.push(err.to_string());
            }
        }
    }

    if data.is_empty() {
        return Err(ProxyError::AllGenerationsFailed(errors));
    }

    let partial = !errors.is_empty();
    if partial {
        tracing::info!(
            success_count = data.len(),
            error_count = errors.len(),
            "image generation partially failed"
        );
    }
    Ok(ImagesResponse {
        created: unix_now_secs(),
        partial_failure: partial.then_some(true),
        error_count: partial.then_some(errors.len()),
        success_count: partial.then_some(data.len()),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryImageCache;
    use crate::images::GenerationParameters;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Records seeds; fails calls whose seed is listed in `failing_seeds`.
    struct FakeBackend {
        seen_seeds: Mutex<Vec<Option<u64>>>,
        failing_seeds: Vec<u64>,
        fail_all: bool,
    }

    impl FakeBackend {
        fn new(failing_seeds: Vec<u64>) -> Self {
            Self {
                seen_seeds: Mutex::new(Vec::new()),
                failing_seeds,
                fail_all: false,
            }
        }
    }

    impl ImageBackend for FakeBackend {
        fn generate(
            &self,
            params: BackendParameters,
        ) -> impl Future<Output = Result<GeneratedImage, ProxyError>> + Send {
            let seed = params.parameters.seed;
            self.seen_seeds.lock().push(seed);
            let fail = self.fail_all || seed.is_some_and(|s| self.failing_seeds.contains(&s));
            async move {
                // Later calls finish first.
                let delay = 30u64.saturating_sub(seed.unwrap_or(0) % 3 * 10);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if fail {
                    return Err(ProxyError::Backend {
                        status: 500,
                        message: format!("seed {seed:?} exploded"),
                    });
                }
                Ok(GeneratedImage {
                    bytes: Bytes::from(format!("img-{}", seed.unwrap_or(0))),
                    content_type: "image/png".into(),
                })
            }
        }
    }

    fn params(seed: Option<u64>) -> BackendParameters {
        BackendParameters {
            inputs: "a fox".into(),
            parameters: GenerationParameters {
                width: 1024,
                height: 1024,
                guidance_scale: None,
                negative_prompt: None,
                num_inference_steps: None,
                scheduler: None,
                seed,
            },
        }
    }

    fn cache() -> ImageCache {
        ImageCache::Memory(MemoryImageCache::new(0, 0))
    }

    #[tokio::test]
    async fn test_single_call_without_seed() {
        let backend = FakeBackend::new(vec![]);
        let cache = cache();
        let response = generate(
            &backend,
            &cache,
            &params(None),
            1,
            ResponseFormat::Url,
            "http://localhost:7860",
        )
        .await
        .unwrap();

        assert_eq!(*backend.seen_seeds.lock(), vec![None]);
        assert_eq!(response.data.len(), 1);
        assert!(response.partial_failure.is_none());
        let ImageData::Url { url } = &response.data[0] else {
            panic!("expected url entry");
        };
        let id = url.strip_prefix("http://localhost:7860/tmp/").unwrap();
        let stored = cache.fetch(id).await.unwrap().unwrap();
        assert_eq!(stored.bytes, Bytes::from_static(b"img-0"));
    }

    #[tokio::test]
    async fn test_seeds_are_offset_per_call() {
        let backend = FakeBackend::new(vec![]);
        let response = generate(
            &backend,
            &cache(),
            &params(Some(100)),
            3,
            ResponseFormat::B64Json,
            "",
        )
        .await
        .unwrap();

        let mut seeds = backend.seen_seeds.lock().clone();
        seeds.sort_unstable();
        assert_eq!(seeds, vec![Some(100), Some(101), Some(102)]);
        assert_eq!(response.data.len(), 3);
        assert_eq!(
            response.data[0],
            ImageData::B64Json {
                b64_json: base64::engine::general_purpose::STANDARD.encode(b"img-100"),
            }
        );
    }

    #[tokio::test]
    async fn test_b64_does_not_touch_cache() {
        let backend = FakeBackend::new(vec![]);
        let cache = ImageCache::Memory(MemoryImageCache::new(0, 0));
        generate(
            &backend,
            &cache,
            &params(None),
            2,
            ResponseFormat::B64Json,
            "",
        )
        .await
        .unwrap();
        let ImageCache::Memory(memory) = &cache else {
            unreachable!()
        };
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let backend = FakeBackend::new(vec![100, 102]);
        let response = generate(
            &backend,
            &cache(),
            &params(Some(100)),
            3,
            ResponseFormat::Url,
            "http://h",
        )
        .await
        .unwrap();

        assert_eq!(response.data.len(), 1);
        assert_eq!(response.partial_failure, Some(true));
        assert_eq!(response.error_count, Some(2));
        assert_eq!(response.success_count, Some(1));
    }

    #[tokio::test]
    async fn test_all_failed_collects_every_error() {
        let mut backend = FakeBackend::new(vec![]);
        backend.fail_all = true;
        let err = generate(
            &backend,
            &cache(),
            &params(Some(1)),
            4,
            ResponseFormat::Url,
            "http://h",
        )
        .await
        .unwrap_err();

        let ProxyError::AllGenerationsFailed(errors) = err else {
            panic!("expected AllGenerationsFailed, got {err:?}");
        };
        assert_eq!(errors.len(), 4);
        assert_eq!(backend.seen_seeds.lock().len(), 4);
    }

    /// Completes only once `n` calls are waiting at the same time.
    struct RendezvousBackend {
        barrier: tokio::sync::Barrier,
    }

    impl ImageBackend for RendezvousBackend {
        fn generate(
            &self,
            _params: BackendParameters,
        ) -> impl Future<Output = Result<GeneratedImage, ProxyError>> + Send {
            async move {
                self.barrier.wait().await;
                Ok(GeneratedImage {
                    bytes: Bytes::from_static(b"img"),
                    content_type: "image/png".into(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_calls_are_in_flight_together() {
        let backend = RendezvousBackend {
            barrier: tokio::sync::Barrier::new(3),
        };
        let response = tokio::time::timeout(
            Duration::from_secs(5),
            generate(
                &backend,
                &cache(),
                &params(None),
                3,
                ResponseFormat::B64Json,
                "",
            ),
        )
        .await
        .expect("calls were not issued concurrently")
        .unwrap();
        assert_eq!(response.data.len(), 3);
    }
}
