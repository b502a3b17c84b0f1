//! # Authentication Middleware
//!
//! The auth gate decides, for every inbound request, whether it may reach the relay.
//!
//! 1. Preflight (`OPTIONS`) requests always pass with an empty context.
//! 2. Requests for a public path pass with an empty context.
//! 3. Everything else needs `Authorization: Bearer <token>`, verified once through the
//!    configured [`TokenVerifier`]. Success attaches a [`RequestContext`] to the request
//!    extensions; any failure short-circuits with the matching [`GatewayError`].

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::path_matcher::PathMatcher;
use crate::auth::providers::TokenVerifier;
use crate::core::config::AuthConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::RequestContext;

/// Result of running a request through the gate
#[derive(Debug)]
pub enum AuthOutcome {
    Allowed(RequestContext),
    Rejected(GatewayError),
}

pub struct AuthGate {
    public_paths: PathMatcher,
    auth_required_by_default: bool,
    /// `None` when the identity provider could not be bootstrapped
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl AuthGate {
    pub fn new(
        public_paths: PathMatcher,
        auth_required_by_default: bool,
        verifier: Option<Arc<dyn TokenVerifier>>,
    ) -> Self {
        Self {
            public_paths,
            auth_required_by_default,
            verifier,
        }
    }

    pub fn from_config(
        config: &AuthConfig,
        verifier: Option<Arc<dyn TokenVerifier>>,
    ) -> GatewayResult<Self> {
        let public_paths = PathMatcher::new(config.public_paths.iter().cloned())?;
        Ok(Self::new(public_paths, config.auth_required_by_default, verifier))
    }

    /// Decide whether a request may proceed
    pub async fn authenticate(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> AuthOutcome {
        if *method == Method::OPTIONS {
            return AuthOutcome::Allowed(RequestContext::anonymous());
        }

        if let Some(pattern) = self.public_paths.matching_pattern(path) {
            debug!(path = %path, pattern = %pattern, "Public path, skipping authentication");
            return AuthOutcome::Allowed(RequestContext::anonymous());
        }

        match self.authenticate_header(headers).await {
            Ok(context) => AuthOutcome::Allowed(context),
            Err(err) => AuthOutcome::Rejected(err),
        }
    }

    async fn authenticate_header(&self, headers: &HeaderMap) -> GatewayResult<RequestContext> {
        // An empty header value counts as missing
        let Some(value) = headers.get(AUTHORIZATION).filter(|v| !v.is_empty()) else {
            if self.auth_required_by_default {
                return Err(GatewayError::MissingAuthHeader);
            }
            return Ok(RequestContext::anonymous());
        };

        let token = value
            .to_str()
            .ok()
            .and_then(extract_bearer_token)
            .ok_or(GatewayError::MalformedAuthHeader)?;

        let verifier = self
            .verifier
            .as_ref()
            .ok_or(GatewayError::VerifierUnavailable)?;

        let claims = verifier.verify(token).await?;
        let subject = claims
            .subject
            .clone()
            .ok_or(GatewayError::MissingSubjectClaim)?;

        Ok(RequestContext::from_claims(subject, claims))
    }
}

/// Split `Bearer <token>`: exactly two whitespace-separated parts, scheme case-insensitive
fn extract_bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

/// Axum middleware function for authentication
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = gate
        .authenticate(request.method(), request.uri().path(), request.headers())
        .await;

    match outcome {
        AuthOutcome::Allowed(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        AuthOutcome::Rejected(err) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                error_type = err.error_type(),
                "Authentication failed: {}",
                err
            );
            err.into_response()
        }
    }
}
