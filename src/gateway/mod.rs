//! # Gateway Module
//!
//! The HTTP server and the forwarding relay it hands authenticated traffic to.

pub mod proxy;
pub mod server;

pub use proxy::{ForwardingRelay, InboundRequest};
pub use server::{build_router, AppState, GatewayServer};
