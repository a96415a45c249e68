use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::ServerConfig;
use crate::error::ProxyError;

const PARSED_URL_CACHE_MAX_ENTRIES: usize = 512;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Option<Duration>,
    use_env_proxy: bool,
) -> Result<reqwest::Client, ProxyError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none());

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ProxyError::Internal(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for every call leaving the proxy.
///
/// Two lazily built pools: one with the configured total timeout for
/// request/response calls, and one without a total timeout for long-lived
/// bodies (event streams and streamed pass-through).
pub struct HttpTransport {
    request_client: OnceLock<reqwest::Client>,
    stream_client: OnceLock<reqwest::Client>,
    parsed_url_cache: RwLock<FxHashMap<String, Arc<url::Url>>>,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
    use_env_proxy: bool,
}

impl HttpTransport {
    /// Create a new transport with pooling and timeouts from the given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        Self {
            request_client: OnceLock::new(),
            stream_client: OnceLock::new(),
            parsed_url_cache: RwLock::new(FxHashMap::default()),
            pool_max_idle_per_host: config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout: Duration::from_secs(config.timeout),
            use_env_proxy: config.http_use_env_proxy,
        }
    }

    fn build_client(&self, timeout: Option<Duration>) -> reqwest::Client {
        match build_reqwest_client(
            self.pool_max_idle_per_host,
            self.pool_idle_timeout,
            timeout,
            self.use_env_proxy,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        }
    }

    fn request_client(&self) -> &reqwest::Client {
        self.request_client
            .get_or_init(|| self.build_client(Some(self.timeout)))
    }

    fn stream_client(&self) -> &reqwest::Client {
        self.stream_client.get_or_init(|| self.build_client(None))
    }

    fn parsed_url(&self, url: &str) -> Result<Arc<url::Url>, ProxyError> {
        if let Some(cached) = self.parsed_url_cache.read().get(url) {
            return Ok(cached.clone());
        }

        let parsed = url::Url::parse(url)
            .map_err(|e| ProxyError::Internal(format!("Invalid backend URL '{url}': {e}")))?;

        let mut cache = self.parsed_url_cache.write();
        if let Some(existing) = cache.get(url) {
            return Ok(existing.clone());
        }
        if cache.len() >= PARSED_URL_CACHE_MAX_ENTRIES {
            cache.clear();
        }
        let parsed = Arc::new(parsed);
        cache.insert(url.to_string(), parsed.clone());
        Ok(parsed)
    }

    async fn execute(
        client: &reqwest::Client,
        url: &url::Url,
        method: http::Method,
        headers: &http::HeaderMap,
        body: Option<bytes::Bytes>,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut request = client.request(method, url.clone()).headers(headers.clone());
        if let Some(body) = body {
            request = request.body(body);
        }
        request.send().await.map_err(|err| {
            tracing::debug!(url = %url, error = %err, "backend request failed");
            ProxyError::BackendUnavailable(format!("{}: {err}", url.as_str()))
        })
    }

    /// Send a request whose response is read in full by the caller.
    ///
    /// The response is returned whatever its status; callers decide how to
    /// surface non-2xx answers.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] for an unparseable URL and
    /// [`ProxyError::BackendUnavailable`] when the call cannot be completed.
    pub async fn send_request(
        &self,
        url: &str,
        method: http::Method,
        headers: &http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let parsed = self.parsed_url(url)?;
        Self::execute(self.request_client(), &parsed, method, headers, Some(body)).await
    }

    /// Send a request whose body is consumed as a stream.
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::send_request`].
    pub async fn send_stream(
        &self,
        url: &str,
        method: http::Method,
        headers: &http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let parsed = self.parsed_url(url)?;
        Self::execute(self.stream_client(), &parsed, method, headers, Some(body)).await
    }

    /// Open a server-sent event stream with a GET request.
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::send_request`].
    pub async fn open_event_stream(&self, url: &url::Url) -> Result<reqwest::Response, ProxyError> {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(
            http::header::CACHE_CONTROL,
            http::HeaderValue::from_static("no-cache"),
        );
        Self::execute(self.stream_client(), url, http::Method::GET, &headers, None).await
    }

    /// Download a resource in full.
    ///
    /// Download URLs are single-use, so they bypass the parsed-URL cache.
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::send_request`].
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, ProxyError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ProxyError::Internal(format!("Invalid download URL '{url}': {e}")))?;
        Self::execute(
            self.request_client(),
            &parsed,
            http::Method::GET,
            &http::HeaderMap::new(),
            None,
        )
        .await
    }
}
