mod headers;
mod http_transport;

pub use headers::{sanitize_forward_headers, upstream_error_message};
pub use http_transport::HttpTransport;
