//! # Configuration Module
//!
//! Configuration is loaded once at startup and never mutated afterwards: the handlers
//! only ever see it through shared, read-only state.
//!
//! ## Loading order
//! 1. Built-in defaults (every section is `#[serde(default)]`)
//! 2. Optional YAML file
//! 3. Environment variable overrides
//! 4. Validation, reporting every problem at once

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};

/// Google's published JWK set for Firebase ID tokens
pub const DEFAULT_FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Service account key looked for in the working directory
pub const DEFAULT_SERVICE_ACCOUNT_FILE: &str = "serviceAccountKey.json";

/// Main gateway configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// Backend base URLs; only `composite` receives traffic
    pub services: ServiceUrls,

    /// Outbound call settings
    pub proxy: ProxyConfig,

    /// Auth gate settings
    pub auth: AuthConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Largest inbound body accepted, in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8000,
            max_body_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceUrls {
    pub composite: String,
    pub users: String,
    pub events: String,
    pub feed: String,
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            composite: "http://localhost:8004".to_string(),
            users: "http://localhost:8001".to_string(),
            events: "http://localhost:8002".to_string(),
            feed: "http://localhost:8003".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Bound on the whole downstream exchange, body included
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Glob patterns (`*` wildcard only) for paths that skip authentication
    pub public_paths: Vec<String>,

    /// When false, protected requests without an `Authorization` header are let through
    pub auth_required_by_default: bool,

    pub firebase: FirebaseConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            public_paths: vec![
                "/".to_string(),
                "/docs".to_string(),
                "/openapi.json".to_string(),
                "/redoc".to_string(),
                "/health".to_string(),
            ],
            auth_required_by_default: true,
            firebase: FirebaseConfig::default(),
        }
    }
}

/// Identity-provider bootstrap parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    /// Explicit project id; wins over the service account file
    pub project_id: Option<String>,

    /// Key file checked first, relative to the working directory
    pub default_service_account_path: PathBuf,

    /// Service account key file, used to discover the project id
    pub service_account_path: Option<PathBuf>,

    pub jwks_url: String,

    /// How long fetched signing keys are trusted before refetching
    #[serde(with = "humantime_serde")]
    pub jwks_cache_ttl: Duration,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            default_service_account_path: PathBuf::from(DEFAULT_SERVICE_ACCOUNT_FILE),
            service_account_path: None,
            jwks_url: DEFAULT_FIREBASE_JWKS_URL.to_string(),
            jwks_cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Subset of a service account key file we care about
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    project_id: Option<String>,
}

impl FirebaseConfig {
    /// The service account file in use: the default key file if present, else the
    /// configured path if it exists
    pub fn key_file(&self) -> Option<&Path> {
        if self.default_service_account_path.exists() {
            return Some(&self.default_service_account_path);
        }

        let path = self.service_account_path.as_deref()?;
        if path.exists() {
            Some(path)
        } else {
            warn!(path = %path.display(), "Service account file not found");
            None
        }
    }

    /// Work out which project tokens must be issued for
    ///
    /// An explicit `project_id` wins, then the service account file. Returns `None`
    /// when neither yields one, which leaves the gateway without a verifier.
    pub async fn resolve_project_id(&self) -> GatewayResult<Option<String>> {
        if let Some(project_id) = self.project_id.as_ref().filter(|p| !p.is_empty()) {
            return Ok(Some(project_id.clone()));
        }

        let Some(path) = self.key_file() else {
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::config(format!(
                "Failed to read service account file {}: {}",
                path.display(),
                e
            ))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&content).map_err(|e| {
            GatewayError::config(format!(
                "Failed to parse service account file {}: {}",
                path.display(),
                e
            ))
        })?;

        info!(path = %path.display(), "Resolved Firebase project from service account");
        Ok(key.project_id.filter(|p| !p.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `path` if it exists, otherwise start from defaults
    pub async fn load<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path).await;
        }

        info!(path = %path.display(), "No configuration file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without overrides or validation
    pub fn from_yaml_str(content: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Service URLs use the same variable names as the backend services'
    /// deployment manifests; gateway-specific settings use the `GATEWAY_` prefix.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COMPOSITE_SERVICE_URL") {
            self.services.composite = url;
        }
        if let Some(url) = lookup("USERS_SERVICE_URL") {
            self.services.users = url;
        }
        if let Some(url) = lookup("EVENTS_SERVICE_URL") {
            self.services.events = url;
        }
        if let Some(url) = lookup("FEED_SERVICE_URL") {
            self.services.feed = url;
        }

        if let Some(path) = lookup("FIREBASE_SERVICE_ACCOUNT_PATH") {
            self.auth.firebase.service_account_path = Some(PathBuf::from(path));
        }
        // Ambient project only applies when no usable service account file is configured
        let has_key_file = self.auth.firebase.key_file().is_some();
        if self.auth.firebase.project_id.is_none() && !has_key_file {
            if let Some(project) = lookup("GOOGLE_CLOUD_PROJECT") {
                self.auth.firebase.project_id = Some(project);
            }
        }

        if let Some(addr) = lookup("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(port) = lookup("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = port.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_HTTP_PORT: {}", e))
            })?;
        }
        if let Some(timeout) = lookup("GATEWAY_UPSTREAM_TIMEOUT") {
            self.proxy.upstream_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_UPSTREAM_TIMEOUT: {}", e))
            })?;
        }

        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
            self.logging.format = format
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_LOG_FORMAT: {}", e)))?;
        }

        Ok(())
    }

    /// Validate the configuration, collecting every problem into one error
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("http_port must be greater than 0".to_string());
        }
        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }
        if self.server.max_body_size == 0 {
            errors.push("max_body_size must be greater than 0".to_string());
        }
        if self.proxy.upstream_timeout.is_zero() {
            errors.push("upstream_timeout must be greater than 0".to_string());
        }

        let services = [
            ("composite", &self.services.composite),
            ("users", &self.services.users),
            ("events", &self.services.events),
            ("feed", &self.services.feed),
        ];
        for (name, raw) in services {
            match Url::parse(raw) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => errors.push(format!(
                    "Service '{}' URL has unsupported scheme '{}'",
                    name,
                    url.scheme()
                )),
                Err(e) => errors.push(format!("Service '{}' URL '{}' is invalid: {}", name, raw, e)),
            }
        }

        for (index, pattern) in self.auth.public_paths.iter().enumerate() {
            if !pattern.starts_with('/') {
                errors.push(format!(
                    "Public path {} ('{}') must start with '/'",
                    index, pattern
                ));
            }
        }

        if self.auth.firebase.jwks_cache_ttl.is_zero() {
            errors.push("jwks_cache_ttl must be greater than 0".to_string());
        }
        if let Err(e) = Url::parse(&self.auth.firebase.jwks_url) {
            errors.push(format!("jwks_url is invalid: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(errors.join("; ")))
        }
    }

    /// Socket address the gateway listens on
    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.bind_address, self.server.http_port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }
}
