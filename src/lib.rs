//! # Auth Gateway Library
//!
//! An authenticating reverse proxy that fronts a single composite backend service.
//! Every request passes through an auth gate that verifies Firebase ID tokens, and
//! admitted requests are relayed to the composite service with the caller's identity
//! attached as headers. All responses carry a permissive CORS policy.
//!
//! ## Modules
//! - `core`: error type, configuration, per-request data
//! - `auth`: the auth gate, public path matching, token verification
//! - `gateway`: HTTP server wiring and the forwarding relay
//! - `middleware`: CORS policy and request tracing layers
//! - `observability`: logging setup

/// Error types, configuration, and request-scoped data
pub mod core;

/// Auth gate and Firebase token verification
pub mod auth;

/// Server and forwarding relay
pub mod gateway;

/// Tower/axum layers shared by every route
pub mod middleware;

/// Structured logging
pub mod observability;

pub use self::core::config::GatewayConfig;
pub use self::core::error::{GatewayError, GatewayResult};
pub use self::core::types::{RequestBody, RequestContext};

pub use self::auth::{AuthGate, FirebaseTokenVerifier, TokenVerifier};
pub use self::gateway::{ForwardingRelay, GatewayServer};
