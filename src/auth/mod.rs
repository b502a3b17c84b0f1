pub mod firebase;
pub mod middleware;
pub mod path_matcher;
pub mod providers;

pub use firebase::FirebaseTokenVerifier;
pub use middleware::{auth_middleware, AuthGate, AuthOutcome};
pub use path_matcher::PathMatcher;
pub use providers::{Claims, TokenVerifier, VerificationError};
