//! # Core Types Module
//!
//! Per-request data carried between the auth gate and the forwarding relay.
//! Nothing here outlives the request that created it.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::auth::providers::Claims;

/// Role assigned when the token carries no custom `role` claim
pub const DEFAULT_ROLE: &str = "user";

/// Identity attached to a request by the auth gate
///
/// An empty context (no subject) is what preflight and public-path requests carry.
/// It is stored in the request extensions and only ever read by the handler that
/// serves the same request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    /// Verified subject identifier, present only if authenticated
    pub identity_subject: Option<String>,

    /// Full verified claim set
    pub decoded_claims: Map<String, Value>,

    /// Email claim, empty string when authenticated without one
    pub email: Option<String>,

    /// Custom role claim, `"user"` when absent
    pub role: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            identity_subject: None,
            decoded_claims: Map::new(),
            email: None,
            role: DEFAULT_ROLE.to_string(),
        }
    }
}

impl RequestContext {
    /// Context for requests that were let through without a token
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build a context from verified claims
    ///
    /// The caller is responsible for rejecting claims without a subject first.
    pub fn from_claims(subject: String, claims: Claims) -> Self {
        Self {
            identity_subject: Some(subject),
            email: Some(claims.email.unwrap_or_default()),
            role: claims.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            decoded_claims: claims.raw,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity_subject.is_some()
    }
}

/// Inbound request payload, classified once when the relay reads it
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No payload (or a method that never carries one)
    Empty,
    /// Payload that decoded as JSON
    ///
    /// The original bytes go downstream, so numbers the parsed value cannot hold
    /// exactly (integers beyond 64 bits, long decimals) arrive untouched.
    Structured { value: Value, bytes: Bytes },
    /// Anything else, forwarded byte for byte
    Raw(Bytes),
}

impl RequestBody {
    /// Classify a payload: valid JSON of any shape is structured, everything else is raw
    pub fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Self::Structured { value, bytes },
            Err(_) => Self::Raw(bytes),
        }
    }

    /// The bytes to send downstream, if any
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Self::Empty => None,
            Self::Structured { bytes, .. } | Self::Raw(bytes) => Some(bytes),
        }
    }
}
