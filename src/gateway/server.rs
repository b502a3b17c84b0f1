//! # HTTP Server Module
//!
//! Wires the pipeline together: every request goes through the auth gate, then either
//! one of the gateway's own endpoints (`/`, `/health`) or the forwarding relay.
//!
//! Layer order, outermost first: tracing, CORS header guarantee, body size limit,
//! auth gate. State is read-only after construction; each request runs on its own
//! task and owns its [`RequestContext`].

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    middleware::{from_fn_with_state, map_response},
    response::{IntoResponse, Response},
    routing::{get, on, MethodFilter, MethodRouter},
    Extension, Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{error, info, instrument};

use crate::auth::firebase::FirebaseTokenVerifier;
use crate::auth::middleware::{auth_middleware, AuthGate};
use crate::auth::providers::TokenVerifier;
use crate::core::config::{GatewayConfig, ServiceUrls};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::RequestContext;
use crate::gateway::proxy::{ForwardingRelay, InboundRequest};
use crate::middleware::{cors, request_logging};

/// Name reported by the gateway's own endpoints
pub const SERVICE_NAME: &str = "api-gateway";

/// Shared, read-only handler state
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ForwardingRelay>,
    pub services: Arc<ServiceUrls>,
}

pub struct GatewayServer {
    bind_addr: SocketAddr,
    app: Router,
}

impl GatewayServer {
    /// Build the server, bootstrapping the Firebase verifier from configuration
    pub async fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let verifier = FirebaseTokenVerifier::from_config(&config.auth.firebase)
            .await?
            .map(|v| Arc::new(v) as Arc<dyn TokenVerifier>);

        Self::new(config, verifier)
    }

    /// Build the server around an already constructed verifier
    pub fn new(
        config: &GatewayConfig,
        verifier: Option<Arc<dyn TokenVerifier>>,
    ) -> GatewayResult<Self> {
        let gate = Arc::new(AuthGate::from_config(&config.auth, verifier)?);
        let state = AppState {
            relay: Arc::new(ForwardingRelay::from_config(config)?),
            services: Arc::new(config.services.clone()),
        };

        Ok(Self {
            bind_addr: config.bind_addr()?,
            app: build_router(state, gate, config.server.max_body_size),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// The fully layered application, for embedding or testing
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Serve until SIGINT/SIGTERM, letting in-flight requests finish
    #[instrument(skip(self), fields(bind_addr = %self.bind_addr))]
    pub async fn start(self) -> GatewayResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            GatewayError::internal(format!(
                "Failed to bind gateway server to {}: {}",
                self.bind_addr, e
            ))
        })?;

        info!("Gateway HTTP server listening on {}", self.bind_addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))
    }
}

/// Assemble routes and layers
pub fn build_router(state: AppState, gate: Arc<AuthGate>, max_body_size: usize) -> Router {
    let proxied_methods = MethodFilter::GET
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::DELETE)
        .or(MethodFilter::PATCH)
        .or(MethodFilter::OPTIONS);

    // GET and OPTIONS on the gateway's own endpoints are answered locally; every
    // other method on those paths goes downstream like any other path
    let local = |handler: MethodRouter<AppState>| {
        handler
            .options(preflight)
            .post(proxy_handler)
            .put(proxy_handler)
            .delete(proxy_handler)
            .patch(proxy_handler)
    };

    Router::new()
        .route("/", local(get(root)))
        .route("/health", local(get(health)))
        .route("/*path", on(proxied_methods, proxy_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(request_logging::trace_layer())
                .layer(map_response(cors::ensure_cors_headers))
                .layer(DefaultBodyLimit::max(max_body_size))
                .layer(from_fn_with_state(gate, auth_middleware)),
        )
}

/// Service banner listing where traffic is routed
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "API Gateway running",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "routes_to": {
            "composite": state.services.composite,
            "users": state.services.users,
            "events": state.services.events,
            "feed": state.services.feed,
        }
    }))
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "healthy", "service": SERVICE_NAME })),
    )
}

async fn preflight() -> Response {
    cors::preflight_response()
}

/// Catch-all handler: everything that is not a gateway endpoint goes downstream
async fn proxy_handler(
    State(state): State<AppState>,
    context: Option<Extension<RequestContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let context = context.map(|Extension(c)| c).unwrap_or_default();
    let request = InboundRequest {
        method,
        uri,
        headers,
        body,
    };

    state.relay.forward(request, &context).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
