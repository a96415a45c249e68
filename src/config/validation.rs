use super::{AppConfig, CacheKind, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_backends(config)?;
    validate_images(config)?;
    validate_cache(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_http_url(field_name: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(validation_err(format!(
            "{field_name} must start with http:// or https://"
        )));
    }
    url::Url::parse(value)
        .map_err(|err| validation_err(format!("{field_name} is not a valid URL: {err}")))?;
    Ok(())
}

fn validate_backends(config: &AppConfig) -> Result<(), ConfigError> {
    validate_http_url("backend.base_url", &config.backend.base_url)?;
    validate_http_url("queue_backend.base_url", &config.queue_backend.base_url)?;
    if config.queue_backend.model.trim().is_empty() {
        return Err(validation_err("queue_backend.model cannot be empty"));
    }
    if !config.queue_backend.guidance_scale.is_finite() {
        return Err(validation_err(
            "queue_backend.guidance_scale must be a finite number",
        ));
    }
    if config.backend.chat_model.trim().is_empty() {
        return Err(validation_err("backend.chat_model cannot be empty"));
    }
    Ok(())
}

fn validate_images(config: &AppConfig) -> Result<(), ConfigError> {
    let images = &config.images;
    if images.default_model.trim().is_empty() {
        return Err(validation_err("images.default_model cannot be empty"));
    }
    if images.max_images_per_request == 0 {
        return Err(validation_err(
            "images.max_images_per_request must be greater than 0",
        ));
    }
    if let Some(public_base_url) = images.public_base_url.as_deref() {
        validate_http_url("images.public_base_url", public_base_url)?;
    }
    Ok(())
}

fn validate_cache(config: &AppConfig) -> Result<(), ConfigError> {
    if config.cache.kind == CacheKind::Disk && config.cache.dir.trim().is_empty() {
        return Err(validation_err(
            "cache.dir cannot be empty when cache.kind is disk",
        ));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "TRACE", "DISABLED",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
