pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Where generated images are kept between generation and lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    Memory,
    Disk,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKind::Memory => write!(f, "memory"),
            CacheKind::Disk => write!(f, "disk"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    7860
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    300
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// Primary inference backend: chat pass-through and synchronous text-to-image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,
    /// Token sent upstream in place of the stripped client `Authorization`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

fn default_backend_base_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}
fn default_chat_model() -> String {
    "meta-llama/Llama-3.2-11B-Vision-Instruct".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_base_url(),
            api_key: None,
            chat_model: default_chat_model(),
        }
    }
}

/// Queue-based generation backend (join + event stream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueBackendConfig {
    /// Requests naming this model are routed to the queue backend.
    #[serde(default = "default_queue_model")]
    pub model: String,
    #[serde(default = "default_queue_base_url")]
    pub base_url: String,
    #[serde(default = "default_fn_index")]
    pub fn_index: u32,
    #[serde(default = "default_queue_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_queue_inference_steps")]
    pub num_inference_steps: u32,
}

fn default_queue_model() -> String {
    "black-forest-labs/FLUX.1-dev".to_string()
}
fn default_queue_base_url() -> String {
    "https://black-forest-labs-flux-1-dev.hf.space".to_string()
}
fn default_fn_index() -> u32 {
    2
}
fn default_queue_guidance_scale() -> f64 {
    3.5
}
fn default_queue_inference_steps() -> u32 {
    28
}

impl Default for QueueBackendConfig {
    fn default() -> Self {
        Self {
            model: default_queue_model(),
            base_url: default_queue_base_url(),
            fn_index: default_fn_index(),
            guidance_scale: default_queue_guidance_scale(),
            num_inference_steps: default_queue_inference_steps(),
        }
    }
}

/// Image generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_image_model")]
    pub default_model: String,
    #[serde(default = "default_max_images_per_request")]
    pub max_images_per_request: u32,
    /// Base used for returned `url` entries; falls back to the request `Host`.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_image_model() -> String {
    "black-forest-labs/FLUX.1-schnell".to_string()
}
fn default_max_images_per_request() -> u32 {
    10
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            default_model: default_image_model(),
            max_images_per_request: default_max_images_per_request(),
            public_base_url: None,
        }
    }
}

/// Generated image cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub kind: CacheKind,
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Memory cache only; `0` disables the bound.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Memory cache only; `0` disables expiry.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_dir() -> String {
    "tmp".to_string()
}
fn default_cache_max_entries() -> usize {
    256
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::default(),
            dir: default_cache_dir(),
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub queue_backend: QueueBackendConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Apply process environment overrides for backend hosts and the public URL.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(base_url) = lookup("HF_API_URL") {
            self.backend.base_url = base_url;
        }
        if let Some(token) = lookup("HF_API_TOKEN") {
            self.backend.api_key = Some(token);
        }
        if let Some(base_url) = lookup("QUEUE_BASE_URL") {
            self.queue_backend.base_url = base_url;
        }
        if let Some(public) = lookup("PUBLIC_BASE_URL") {
            self.images.public_base_url = Some(public);
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => AppConfig::default(),
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    config.apply_env_overrides();
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 7860);
        assert_eq!(config.cache.kind, CacheKind::Memory);
        assert_eq!(config.queue_backend.fn_index, 2);
        assert_eq!(config.images.max_images_per_request, 10);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("cache:\n  kind: disk\n").unwrap();
        assert_eq!(config.cache.kind, CacheKind::Disk);
        assert_eq!(config.cache.dir, "tmp");
        assert_eq!(config.server.timeout, 300);
        assert_eq!(
            config.backend.base_url,
            "https://api-inference.huggingface.co"
        );
    }

    #[test]
    fn test_cache_kind_serde() {
        let json = serde_json::to_string(&CacheKind::Disk).unwrap();
        assert_eq!(json, "\"disk\"");
        let kind: CacheKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(kind, CacheKind::Memory);
    }

    #[test]
    fn test_env_overrides_skip_blank_values() {
        let mut config = AppConfig::default();
        config.apply_overrides_from(|key| match key {
            "HF_API_URL" => Some("http://127.0.0.1:9000".to_string()),
            "PUBLIC_BASE_URL" => Some("https://img.example.com".to_string()),
            "HF_API_TOKEN" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.backend.base_url, "http://127.0.0.1:9000");
        assert_eq!(
            config.images.public_base_url.as_deref(),
            Some("https://img.example.com")
        );
        assert!(config.backend.api_key.is_none());
    }
}
