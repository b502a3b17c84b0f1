//! Fixed, permissive cross-origin policy.
//!
//! Every origin is allowed and credentials are always advertised. The same four
//! headers go on preflight answers, on relayed responses and on the gateway's own
//! responses (rejections included), so browsers can always read the outcome.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
pub const ALLOW_HEADERS: &str = "*";
pub const ALLOW_CREDENTIALS: &str = "true";
pub const MAX_AGE: &str = "3600";
pub const EXPOSE_HEADERS: &str = "ETag, Location, Content-Type, x-firebase-uid";

fn policy() -> [(header::HeaderName, HeaderValue); 4] {
    [
        (
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static(ALLOW_CREDENTIALS),
        ),
    ]
}

/// Overwrite the four CORS headers and expose the headers browsers need to read
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    for (name, value) in policy() {
        headers.insert(name, value);
    }
    if !headers.contains_key(header::ACCESS_CONTROL_EXPOSE_HEADERS) {
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSE_HEADERS),
        );
    }
}

/// `200` with an empty body and the policy plus max-age
pub fn preflight_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    for (name, value) in policy() {
        headers.insert(name, value);
    }
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE));

    response
}

/// Response mapper: fill in any CORS header a handler did not set itself
pub async fn ensure_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in policy() {
        if !headers.contains_key(&name) {
            headers.insert(name, value);
        }
    }
    response
}
