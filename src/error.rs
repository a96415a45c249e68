use serde_json::{json, Value};

/// Error type shared by the translator, backends, cache and handlers.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Backend error: status={status}, message={message}")]
    Backend { status: u16, message: String },
    #[error("All {} image generations failed", .0.len())]
    AllGenerationsFailed(Vec<String>),
    #[error("Not found")]
    NotFound,
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    NotFound,
    BadGateway,
    Upstream(u16),
    ServerError,
}

impl ProxyError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProxyError::Validation(_) => ErrorCategory::InvalidRequest,
            ProxyError::NotFound => ErrorCategory::NotFound,
            ProxyError::BackendUnavailable(_) => ErrorCategory::BadGateway,
            ProxyError::Backend { status, .. } => ErrorCategory::Upstream(*status),
            ProxyError::Config(_)
            | ProxyError::AllGenerationsFailed(_)
            | ProxyError::Internal(_) => ErrorCategory::ServerError,
        }
    }

    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        http_status_for_category(self.category())
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => http::StatusCode::NOT_FOUND,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::Upstream(status) => http::StatusCode::from_u16(status)
            .ok()
            .filter(|code| code.is_client_error() || code.is_server_error())
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR),
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::NotFound => "not_found_error",
        ErrorCategory::BadGateway | ErrorCategory::Upstream(_) => "upstream_error",
        ErrorCategory::ServerError => "server_error",
    }
}

/// JSON body for an error, or `None` when the response carries no payload.
#[must_use]
pub fn error_payload(err: &ProxyError) -> Option<Value> {
    match err {
        ProxyError::NotFound => None,
        ProxyError::AllGenerationsFailed(errors) => Some(json!({
            "error": err.to_string(),
            "errors": errors,
        })),
        _ => Some(json!({
            "error": {
                "message": err.to_string(),
                "type": openai_error_type(err.category()),
                "code": err.status().as_u16(),
            }
        })),
    }
}

impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match error_payload(&self) {
            Some(body) => (status, axum::Json(body)).into_response(),
            None => status.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::Validation("x".into()).status(),
            http::StatusCode::BAD_REQUEST
        );
        assert_eq!(ProxyError::NotFound.status(), http::StatusCode::NOT_FOUND);
        assert_eq!(
            ProxyError::BackendUnavailable("down".into()).status(),
            http::StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Backend {
                status: 503,
                message: "loading".into()
            }
            .status(),
            http::StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::Backend {
                status: 200,
                message: "odd".into()
            }
            .status(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_all_failed_payload_lists_errors() {
        let err = ProxyError::AllGenerationsFailed(vec!["a".into(), "b".into()]);
        let body = error_payload(&err).unwrap();
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
        assert!(body.get("data").is_none());
        assert_eq!(body["error"], "All 2 image generations failed");
    }

    #[test]
    fn test_not_found_has_no_payload() {
        assert!(error_payload(&ProxyError::NotFound).is_none());
    }
}
