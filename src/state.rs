use http::{HeaderMap, Uri};

use crate::cache::ImageCache;
use crate::config::AppConfig;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub cache: ImageCache,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let transport = HttpTransport::new(&config.server);
        let cache = ImageCache::from_config(&config.cache);
        Self {
            config,
            transport,
            cache,
        }
    }

    /// Base for image URLs handed back to clients.
    ///
    /// The configured public base wins, then the request `Host` header, then
    /// the request URI authority (HTTP/2 `:authority`).
    #[must_use]
    pub fn public_base_url(&self, headers: &HeaderMap, uri: &Uri) -> String {
        if let Some(base) = self.config.images.public_base_url.as_deref() {
            return base.trim_end_matches('/').to_string();
        }
        if let Some(host) = headers
            .get(http::header::HOST)
            .and_then(|value| value.to_str().ok())
            .filter(|host| !host.is_empty())
        {
            return format!("http://{host}");
        }
        match uri.authority() {
            Some(authority) => format!("{}://{authority}", uri.scheme_str().unwrap_or("http")),
            None => "http://localhost".to_string(),
        }
    }

    /// Headers sent to the primary backend, derived from the client's.
    #[must_use]
    pub fn backend_headers(&self, headers: &HeaderMap) -> HeaderMap {
        crate::transport::sanitize_forward_headers(headers, self.config.backend.api_key.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_base_url_prefers_config() {
        let mut config = AppConfig::default();
        config.images.public_base_url = Some("https://img.example.com/".into());
        let state = AppState::new(config);
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, "proxy.local:7860".parse().unwrap());
        let uri = Uri::from_static("/v1/images/generations");
        assert_eq!(state.public_base_url(&headers, &uri), "https://img.example.com");
    }

    #[test]
    fn test_public_base_url_falls_back_to_host() {
        let state = AppState::new(AppConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, "proxy.local:7860".parse().unwrap());
        let uri = Uri::from_static("/v1/images/generations");
        assert_eq!(state.public_base_url(&headers, &uri), "http://proxy.local:7860");
        assert_eq!(
            state.public_base_url(&HeaderMap::new(), &uri),
            "http://localhost"
        );
    }

    #[test]
    fn test_public_base_url_uses_uri_authority_without_host() {
        let state = AppState::new(AppConfig::default());
        let uri = Uri::from_static("http://proxy.test:7860/v1/images/generations");
        assert_eq!(
            state.public_base_url(&HeaderMap::new(), &uri),
            "http://proxy.test:7860"
        );
        let uri = Uri::from_static("https://proxy.test/v1/images/generations");
        assert_eq!(
            state.public_base_url(&HeaderMap::new(), &uri),
            "https://proxy.test"
        );
    }
}
