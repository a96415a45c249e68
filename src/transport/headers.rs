use http::header::{
    HeaderName, ACCEPT_ENCODING, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, HOST,
    PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use http::{HeaderMap, HeaderValue};

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

const STRIPPED_HEADERS: [HeaderName; 11] = [
    AUTHORIZATION,
    PROXY_AUTHORIZATION,
    HOST,
    CONTENT_LENGTH,
    CONNECTION,
    KEEP_ALIVE,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
    ACCEPT_ENCODING,
];

/// Build the header set forwarded to the backend.
///
/// Client credentials and hop-by-hop headers never leave the proxy. When a
/// backend token is configured it is sent as the bearer instead.
#[must_use]
pub fn sanitize_forward_headers(headers: &HeaderMap, backend_token: Option<&str>) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in &STRIPPED_HEADERS {
        forwarded.remove(name);
    }
    if let Some(token) = backend_token {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                forwarded.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("configured backend token is not a valid header value"),
        }
    }
    forwarded
}

/// Reduce an upstream error body to a short message.
///
/// Understands `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": ...}`; anything else is returned as lossy UTF-8 capped at
/// 500 bytes.
#[must_use]
pub fn upstream_error_message(body: &[u8]) -> String {
    const MAX_LEN: usize = 500;

    fn truncate(msg: &str) -> String {
        if msg.len() <= MAX_LEN {
            return msg.to_string();
        }
        let mut end = MAX_LEN;
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &msg[..end])
    }

    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = json
            .get("error")
            .and_then(|e| e.get("message").and_then(|m| m.as_str()).or(e.as_str()))
            .or_else(|| json.get("message").and_then(|m| m.as_str()));
        if let Some(message) = message {
            return truncate(message);
        }
    }

    truncate(&String::from_utf8_lossy(body))
}
