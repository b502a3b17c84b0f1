//! # Firebase ID Token Verifier
//!
//! Verifies Firebase ID tokens locally: RS256 signature against Google's published
//! JWK set, audience equal to the project id, issuer
//! `https://securetoken.google.com/<project_id>`, and expiry.
//!
//! Signing keys are fetched lazily and cached for `jwks_cache_ttl`. A token whose
//! `kid` is not in the cache forces a refetch, which covers key rotation, but at most
//! one fetch is attempted per [`MIN_REFRESH_INTERVAL`]; within that window unknown
//! key ids are rejected straight away. Concurrent refreshes are coalesced behind a
//! `tokio::sync::Mutex`. The cache itself sits behind a `parking_lot::RwLock` that is
//! never held across an `.await`.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::auth::providers::{Claims, TokenVerifier, VerificationError};
use crate::core::config::FirebaseConfig;
use crate::core::error::{GatewayError, GatewayResult};

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum spacing between two signing-key fetches
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct FirebaseTokenVerifier {
    project_id: String,
    jwks_url: String,
    cache_ttl: Duration,
    client: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
    /// Start of the most recent fetch, successful or not
    last_attempt: Mutex<Option<Instant>>,
    /// Held for the duration of a fetch
    refresh: tokio::sync::Mutex<()>,
}

impl FirebaseTokenVerifier {
    pub fn new(
        project_id: impl Into<String>,
        jwks_url: impl Into<String>,
        cache_ttl: Duration,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to build JWKS client: {}", e)))?;

        Ok(Self {
            project_id: project_id.into(),
            jwks_url: jwks_url.into(),
            cache_ttl,
            client,
            keys: RwLock::new(None),
            last_attempt: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
        })
    }

    /// Build a verifier from configuration
    ///
    /// Returns `Ok(None)` when no project id can be resolved; the gateway still starts
    /// but every protected request is refused as "not initialized".
    pub async fn from_config(config: &FirebaseConfig) -> GatewayResult<Option<Self>> {
        match config.resolve_project_id().await? {
            Some(project_id) => {
                info!(project_id = %project_id, "Firebase token verifier initialized");
                Self::new(project_id, config.jwks_url.clone(), config.jwks_cache_ttl).map(Some)
            }
            None => {
                warn!("Firebase initialization failed - no credentials found");
                Ok(None)
            }
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("{}{}", ISSUER_PREFIX, self.project_id)]);
        validation
    }

    /// Key for `kid` from the cache; stale entries only when `allow_stale`
    fn cached_key(
        &self,
        kid: &str,
        allow_stale: bool,
    ) -> Option<Result<DecodingKey, VerificationError>> {
        let guard = self.keys.read();
        let cached = guard.as_ref()?;
        if !allow_stale && cached.fetched_at.elapsed() >= self.cache_ttl {
            return None;
        }
        let jwk = cached.set.find(kid)?;
        Some(DecodingKey::from_jwk(jwk).map_err(|_| VerificationError::Invalid))
    }

    /// Whether enough time has passed since the last fetch to try another
    fn refresh_allowed(&self) -> bool {
        let last_attempt = *self.last_attempt.lock();
        last_attempt.map_or(true, |at| at.elapsed() >= MIN_REFRESH_INTERVAL)
    }

    async fn refresh_keys(&self) -> Result<(), VerificationError> {
        debug!(url = %self.jwks_url, "Fetching signing keys");
        *self.last_attempt.lock() = Some(Instant::now());

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerificationError::Other(format!("failed to fetch signing keys: {}", e)))?;

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| VerificationError::Other(format!("failed to parse signing keys: {}", e)))?;

        debug!(keys = set.keys.len(), "Signing keys refreshed");
        *self.keys.write() = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, VerificationError> {
        if let Some(key) = self.cached_key(kid, false) {
            return key;
        }

        let _refreshing = self.refresh.lock().await;

        // Another task may have refreshed while we waited
        if let Some(key) = self.cached_key(kid, false) {
            return key;
        }

        if !self.refresh_allowed() {
            debug!(kid = %kid, "Signing key refresh throttled");
            return self.cached_key(kid, true).unwrap_or_else(|| {
                if self.keys.read().is_some() {
                    Err(VerificationError::Invalid)
                } else {
                    Err(VerificationError::Other(
                        "signing keys unavailable, retry later".to_string(),
                    ))
                }
            });
        }

        if let Err(err) = self.refresh_keys().await {
            // Keep verifying against the previous key set while the endpoint is down
            return match self.cached_key(kid, true) {
                Some(key) => {
                    warn!(error = %err, "Signing key refresh failed, using cached keys");
                    key
                }
                None => Err(err),
            };
        }

        self.cached_key(kid, true).unwrap_or_else(|| {
            debug!(kid = %kid, "Token signed with unknown key");
            Err(VerificationError::Invalid)
        })
    }
}

/// Classify a decode failure
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> VerificationError {
    match err.kind() {
        ErrorKind::ExpiredSignature => VerificationError::Expired,
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => VerificationError::Invalid,
        _ => VerificationError::Other(err.to_string()),
    }
}

#[async_trait]
impl TokenVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        let header = decode_header(token).map_err(map_jwt_error)?;
        if header.alg != Algorithm::RS256 {
            return Err(VerificationError::Invalid);
        }
        let kid = header.kid.ok_or(VerificationError::Invalid)?;

        let key = self.key_for(&kid).await?;
        let data = decode::<Map<String, Value>>(token, &key, &self.validation())
            .map_err(map_jwt_error)?;

        Ok(Claims::from_map(data.claims))
    }
}
