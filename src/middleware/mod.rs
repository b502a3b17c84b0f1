pub mod cors;
pub mod request_logging;

pub use cors::{apply_cors_headers, ensure_cors_headers, preflight_response};
pub use request_logging::{trace_layer, RequestSpan};
