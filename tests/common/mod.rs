//! Shared helpers for the gateway integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use auth_gateway::auth::{Claims, TokenVerifier, VerificationError};
use auth_gateway::{GatewayConfig, GatewayServer};
use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const USER_TOKEN: &str = "user-token";
pub const EXPIRED_TOKEN: &str = "expired-token";

/// Verifier with a fixed token table
pub struct StubVerifier;

#[async_trait]
impl TokenVerifier for StubVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        let claims = match token {
            ADMIN_TOKEN => json!({
                "sub": "uid-123",
                "email": "admin@example.com",
                "role": "admin",
            }),
            USER_TOKEN => json!({ "uid": "uid-456", "email": "user@example.com" }),
            EXPIRED_TOKEN => return Err(VerificationError::Expired),
            _ => return Err(VerificationError::Invalid),
        };

        match claims {
            Value::Object(map) => Ok(Claims::from_map(map)),
            _ => Err(VerificationError::Invalid),
        }
    }
}

/// Configuration pointing the relay at `composite`
pub fn config_for(composite: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services.composite = composite.to_string();
    config.proxy.upstream_timeout = Duration::from_secs(5);
    config
}

pub fn test_server(config: &GatewayConfig) -> TestServer {
    let verifier: Arc<dyn TokenVerifier> = Arc::new(StubVerifier);
    let server = GatewayServer::new(config, Some(verifier)).unwrap();
    TestServer::new(server.router()).unwrap()
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}
