//! Configuration file parser for ~/.config/subtally/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as likely typos.
//! Secrets can also come from the environment (`SUBTALLY_CLIENT_SECRET`,
//! `SUBTALLY_ACCESS_TOKEN`), which takes precedence over the file.
use crate::auth::OAuthSettings;
use crate::feed::PollSettings;
use crate::ratelimit::{RateLimitSnapshot, DEFAULT_REMAINING, DEFAULT_RESET_SECS};
use crate::util::validate_base_uri;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CLIENT_SECRET_ENV: &str = "SUBTALLY_CLIENT_SECRET";
pub const ACCESS_TOKEN_ENV: &str = "SUBTALLY_ACCESS_TOKEN";

/// Largest page the listing API will return.
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `Debug` masks `client_secret` and `access_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OAuth application id. Required unless `access_token` is set.
    pub client_id: String,

    /// OAuth application secret (empty for installed apps).
    pub client_secret: Option<String>,

    /// Pre-issued bearer token; skips the interactive authorization.
    pub access_token: Option<String>,

    /// Listing API root.
    pub base_uri: String,

    /// Host serving the authorize and token endpoints.
    pub auth_base_uri: String,

    /// Authorize URL with `{client_id}` and `{redirect_uri}` placeholders.
    pub authorize_url_template: String,

    pub redirect_uri: String,

    pub user_agent: String,

    /// Posts per listing page, 1..=100.
    pub page_size: u32,

    /// Cap on concurrently outstanding listing requests.
    pub max_concurrent_requests: usize,

    /// Floor for any non-zero delay between requests, in seconds (>= 1).
    pub min_delay_secs: u64,

    pub request_timeout_secs: u64,

    /// Assumed budget before the first response arrives.
    pub initial_remaining: i64,
    pub initial_reset_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            access_token: None,
            base_uri: "https://oauth.reddit.com".to_string(),
            auth_base_uri: "https://www.reddit.com".to_string(),
            authorize_url_template: "https://www.reddit.com/api/v1/authorize?client_id={client_id}&response_type=code&state=subtally&redirect_uri={redirect_uri}&duration=temporary&scope=read".to_string(),
            redirect_uri: "http://localhost:8080".to_string(),
            user_agent: concat!("subtally/", env!("CARGO_PKG_VERSION")).to_string(),
            page_size: MAX_PAGE_SIZE,
            max_concurrent_requests: 4,
            min_delay_secs: 1,
            request_timeout_secs: 30,
            initial_remaining: DEFAULT_REMAINING,
            initial_reset_secs: DEFAULT_RESET_SECS,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("base_uri", &self.base_uri)
            .field("auth_base_uri", &self.auth_base_uri)
            .field("authorize_url_template", &self.authorize_url_template)
            .field("redirect_uri", &self.redirect_uri)
            .field("user_agent", &self.user_agent)
            .field("page_size", &self.page_size)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("min_delay_secs", &self.min_delay_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("initial_remaining", &self.initial_remaining)
            .field("initial_reset_secs", &self.initial_reset_secs)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 14] = [
        "client_id",
        "client_secret",
        "access_token",
        "base_uri",
        "auth_base_uri",
        "authorize_url_template",
        "redirect_uri",
        "user_agent",
        "page_size",
        "max_concurrent_requests",
        "min_delay_secs",
        "request_timeout_secs",
        "initial_remaining",
        "initial_reset_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// Values are not range-checked here; see [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never pulled into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse config file contents.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            base_uri = %config.base_uri,
            page_size = config.page_size,
            max_concurrent_requests = config.max_concurrent_requests,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply environment overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup`. Empty values are ignored.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = non_empty(CLIENT_SECRET_ENV) {
            tracing::debug!(var = CLIENT_SECRET_ENV, "Client secret taken from environment");
            self.client_secret = Some(secret);
        }
        if let Some(token) = non_empty(ACCESS_TOKEN_ENV) {
            tracing::debug!(var = ACCESS_TOKEN_ENV, "Access token taken from environment");
            self.access_token = Some(token);
        }
        self
    }

    /// Check ranges and URI policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(invalid(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(invalid("max_concurrent_requests must be at least 1"));
        }
        if self.min_delay_secs == 0 {
            return Err(invalid("min_delay_secs must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs must be at least 1"));
        }
        if self.initial_remaining < 0 || self.initial_reset_secs < 0 {
            return Err(invalid("initial rate-limit values must not be negative"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(invalid("user_agent must not be empty"));
        }

        validate_base_uri(&self.base_uri)
            .map_err(|e| invalid(format!("base_uri: {e}")))?;

        if self.access_token.is_none() {
            if self.client_id.trim().is_empty() {
                return Err(invalid("client_id is required unless access_token is set"));
            }
            validate_base_uri(&self.auth_base_uri)
                .map_err(|e| invalid(format!("auth_base_uri: {e}")))?;
        }

        Ok(())
    }

    pub fn poll_settings(&self) -> Result<PollSettings, ConfigError> {
        Ok(PollSettings {
            base_uri: validate_base_uri(&self.base_uri)
                .map_err(|e| invalid(format!("base_uri: {e}")))?,
            user_agent: self.user_agent.clone(),
            page_size: self.page_size,
            min_delay: Duration::from_secs(self.min_delay_secs),
            request_timeout: self.request_timeout(),
        })
    }

    pub fn oauth_settings(&self) -> Result<OAuthSettings, ConfigError> {
        Ok(OAuthSettings {
            auth_base_uri: validate_base_uri(&self.auth_base_uri)
                .map_err(|e| invalid(format!("auth_base_uri: {e}")))?,
            client_id: self.client_id.clone(),
            client_secret: SecretString::from(self.client_secret.clone().unwrap_or_default()),
            redirect_uri: self.redirect_uri.clone(),
            authorize_url_template: self.authorize_url_template.clone(),
            user_agent: self.user_agent.clone(),
            request_timeout: self.request_timeout(),
        })
    }

    pub fn rate_limit_seed(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            remaining: self.initial_remaining,
            reset_secs: self.initial_reset_secs,
            used: 0,
            in_flight: 0,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

// ============================================================================
// Tests
// ============================================================================
