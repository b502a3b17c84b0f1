//! # Token Verification Providers
//!
//! The auth gate never talks to an identity provider directly. It holds a
//! [`TokenVerifier`] built once at startup and shared across every request task,
//! so implementations must be safe under concurrent use.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::error::GatewayError;

/// Why a token could not be verified
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationError {
    #[error("token expired")]
    Expired,

    /// Bad signature, malformed, revoked, wrong audience/issuer, unknown key
    #[error("invalid token")]
    Invalid,

    #[error("token verifier unavailable")]
    Unavailable,

    #[error("{0}")]
    Other(String),
}

impl From<VerificationError> for GatewayError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Expired => GatewayError::TokenExpired,
            VerificationError::Invalid => GatewayError::TokenInvalid,
            VerificationError::Unavailable => GatewayError::VerifierUnavailable,
            VerificationError::Other(cause) => GatewayError::verification_other(cause),
        }
    }
}

/// Verified token attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Claims {
    pub subject: Option<String>,
    pub email: Option<String>,
    /// Custom `role` claim
    pub role: Option<String>,
    /// Every claim in the token, untouched
    pub raw: Map<String, Value>,
}

impl Claims {
    /// Pull the well-known attributes out of a decoded claim set
    ///
    /// The subject is `sub`, falling back to `uid`. Empty or non-string values count
    /// as absent.
    pub fn from_map(raw: Map<String, Value>) -> Self {
        let string_claim = |name: &str| {
            raw.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            subject: string_claim("sub").or_else(|| string_claim("uid")),
            email: string_claim("email"),
            role: string_claim("role"),
            raw,
        }
    }
}

/// Identity-provider capability used by the auth gate
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a bearer token and return its claims
    async fn verify(&self, token: &str) -> Result<Claims, VerificationError>;
}
