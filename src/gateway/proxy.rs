//! # Forwarding Relay
//!
//! Sends every admitted request to the single composite service and hands the
//! answer back unchanged apart from CORS headers.
//!
//! Outbound requests carry a fixed header set: `Content-Type: application/json`, the
//! identity headers from the gate (`x-firebase-uid` only when authenticated,
//! `x-user-role` always), and `Authorization`, `If-None-Match` and `If-Match` copied
//! from the caller when present. Request bodies are only read for `POST`, `PUT` and
//! `PATCH`. The whole exchange, response body included, is bounded by the configured
//! upstream timeout; any transport-level failure becomes a `502`.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{RequestBody, RequestContext, DEFAULT_ROLE};
use crate::middleware::cors;

pub const FIREBASE_UID_HEADER: &str = "x-firebase-uid";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Inbound headers copied to the downstream request, as (source, destination) names
const FORWARDED_HEADERS: [(&str, &str); 3] = [
    ("authorization", "Authorization"),
    ("if-none-match", "If-None-Match"),
    ("if-match", "If-Match"),
];

/// Downstream response headers that describe the hop rather than the payload
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The parts of an inbound request the relay needs
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Downstream answer, already converted to the server's header types
struct DownstreamResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

pub struct ForwardingRelay {
    client: reqwest::Client,
    /// Base URL without a trailing slash
    target: String,
    timeout: Duration,
}

impl ForwardingRelay {
    pub fn new(target: &str, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .http1_title_case_headers()
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            target: target.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        Self::new(&config.services.composite, config.proxy.upstream_timeout)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Downstream URL for an inbound path: base + `/` + path without its leading slash
    pub fn target_url(&self, path: &str) -> String {
        format!("{}/{}", self.target, path.trim_start_matches('/'))
    }

    /// Relay one request and produce the response for the caller
    pub async fn forward(&self, request: InboundRequest, context: &RequestContext) -> Response {
        if request.method == Method::OPTIONS {
            return cors::preflight_response();
        }

        let started = Instant::now();
        match self.send(request, context).await {
            Ok(downstream) => {
                debug!(
                    status = downstream.status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Downstream response relayed"
                );
                relay_response(downstream)
            }
            Err(err) => {
                warn!(
                    target_service = %self.target,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "Downstream call failed"
                );
                err.into_response()
            }
        }
    }

    async fn send(
        &self,
        request: InboundRequest,
        context: &RequestContext,
    ) -> GatewayResult<DownstreamResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| GatewayError::internal(format!("Unsupported method: {}", e)))?;
        let url = self.target_url(request.uri.path());
        let query = query_params(request.uri.query());

        let body = if carries_body(&request.method) {
            RequestBody::from_bytes(request.body)
        } else {
            RequestBody::Empty
        };

        debug!(
            url = %url,
            authenticated = context.is_authenticated(),
            body = body_kind(&body),
            "Forwarding request downstream"
        );

        let mut builder = self
            .client
            .request(method, &url)
            .headers(outbound_headers(&request.headers, context))
            .timeout(self.timeout);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(payload) = body.payload() {
            builder = builder.body(payload.clone());
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| GatewayError::downstream(format!("invalid status code: {}", e)))?;
        let headers = convert_response_headers(response.headers());
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(DownstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

fn body_kind(body: &RequestBody) -> &'static str {
    match body {
        RequestBody::Empty => "empty",
        RequestBody::Structured { .. } => "json",
        RequestBody::Raw(_) => "raw",
    }
}

/// Decode the query string into parameters; a repeated key keeps its last value
fn query_params(query: Option<&str>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match params.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value.into_owned(),
            None => params.push((key.into_owned(), value.into_owned())),
        }
    }
    params
}

/// Build the downstream header set from the inbound headers and the gate's context
fn outbound_headers(inbound: &HeaderMap, context: &RequestContext) -> reqwest::header::HeaderMap {
    use reqwest::header::{HeaderName as OutName, HeaderValue as OutValue};

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        OutValue::from_static("application/json"),
    );

    if let Some(uid) = &context.identity_subject {
        match OutValue::from_str(uid) {
            Ok(value) => {
                headers.insert(OutName::from_static(FIREBASE_UID_HEADER), value);
            }
            Err(_) => warn!("Subject is not a valid header value, not forwarding it"),
        }
    }

    let role = if context.role.is_empty() {
        DEFAULT_ROLE
    } else {
        context.role.as_str()
    };
    let role = OutValue::from_str(role).unwrap_or_else(|_| OutValue::from_static(DEFAULT_ROLE));
    headers.insert(OutName::from_static(USER_ROLE_HEADER), role);

    for (source, destination) in FORWARDED_HEADERS {
        let Some(value) = inbound.get(source) else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            OutName::from_bytes(destination.as_bytes()),
            OutValue::from_bytes(value.as_bytes()),
        ) {
            headers.insert(name, value);
        }
    }

    headers
}

/// Copy downstream headers except hop-by-hop ones and `content-length`
fn convert_response_headers(source: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        let name = name.as_str();
        if name == "content-length" || HOP_BY_HOP_HEADERS.contains(&name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

fn relay_response(downstream: DownstreamResponse) -> Response {
    let mut response = Response::new(Body::from(downstream.body));
    *response.status_mut() = downstream.status;

    let headers = response.headers_mut();
    *headers = downstream.headers;
    cors::apply_cors_headers(headers);
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    response
}

/// Turn a client error into a 502, keeping the whole cause chain in the message
fn transport_error(err: reqwest::Error) -> GatewayError {
    let mut cause = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        cause.push_str(": ");
        cause.push_str(&inner.to_string());
        source = inner.source();
    }
    GatewayError::downstream(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn authenticated_context() -> RequestContext {
        RequestContext {
            identity_subject: Some("uid-42".to_string()),
            decoded_claims: Map::new(),
            email: Some("a@example.com".to_string()),
            role: "admin".to_string(),
        }
    }

    #[test]
    fn test_target_url_joins_path() {
        let relay = ForwardingRelay::new("http://composite:8004/", Duration::from_secs(30)).unwrap();
        assert_eq!(relay.target(), "http://composite:8004");
        assert_eq!(relay.target_url("/users/me"), "http://composite:8004/users/me");
        assert_eq!(relay.target_url("/"), "http://composite:8004/");
        assert_eq!(relay.target_url("events"), "http://composite:8004/events");
    }

    #[test]
    fn test_query_params_last_value_wins() {
        assert!(query_params(None).is_empty());
        assert_eq!(
            query_params(Some("a=1&b=two%20words&a=3")),
            vec![
                ("a".to_string(), "3".to_string()),
                ("b".to_string(), "two words".to_string())
            ]
        );
    }

    #[test]
    fn test_outbound_headers_for_authenticated_request() {
        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", HeaderValue::from_static("Bearer t"));
        inbound.insert("if-none-match", HeaderValue::from_static("\"v1\""));
        inbound.insert("x-unrelated", HeaderValue::from_static("dropped"));
        inbound.insert("cookie", HeaderValue::from_static("session=1"));

        let headers = outbound_headers(&inbound, &authenticated_context());
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-firebase-uid"], "uid-42");
        assert_eq!(headers["x-user-role"], "admin");
        assert_eq!(headers["authorization"], "Bearer t");
        assert_eq!(headers["if-none-match"], "\"v1\"");
        assert!(!headers.contains_key("if-match"));
        assert!(!headers.contains_key("x-unrelated"));
        assert!(!headers.contains_key("cookie"));
    }

    #[test]
    fn test_outbound_headers_for_anonymous_request() {
        let headers = outbound_headers(&HeaderMap::new(), &RequestContext::anonymous());
        assert!(!headers.contains_key("x-firebase-uid"));
        assert_eq!(headers["x-user-role"], "user");
        assert!(!headers.contains_key("authorization"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_response_header_filtering() {
        let mut source = reqwest::header::HeaderMap::new();
        source.insert("etag", reqwest::header::HeaderValue::from_static("\"abc\""));
        source.insert("content-length", reqwest::header::HeaderValue::from_static("10"));
        source.insert("transfer-encoding", reqwest::header::HeaderValue::from_static("chunked"));
        source.append("set-cookie", reqwest::header::HeaderValue::from_static("a=1"));
        source.append("set-cookie", reqwest::header::HeaderValue::from_static("b=2"));

        let headers = convert_response_headers(&source);
        assert_eq!(headers["etag"], "\"abc\"");
        assert!(!headers.contains_key("content-length"));
        assert!(!headers.contains_key("transfer-encoding"));
        assert_eq!(headers.get_all("set-cookie").iter().count(), 2);
    }

    #[tokio::test]
    async fn test_relay_response_defaults_content_type() {
        let response = relay_response(DownstreamResponse {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"err":"nf"}"#),
        });

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            json!({"err": "nf"})
        );
    }

    #[tokio::test]
    async fn test_preflight_bypasses_downstream() {
        // Nothing listens on this port; a downstream call would fail with 502
        let relay = ForwardingRelay::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let request = InboundRequest {
            method: Method::OPTIONS,
            uri: Uri::from_static("/users/me"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };

        let response = relay.forward(request, &RequestContext::anonymous()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-max-age"], "3600");
    }

    #[tokio::test]
    async fn test_connection_refused_is_bad_gateway() {
        let relay = ForwardingRelay::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let request = InboundRequest {
            method: Method::GET,
            uri: Uri::from_static("/users/me"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };

        let response = relay.forward(request, &RequestContext::anonymous()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Failed to forward request to Composite Service: "));
    }
}
