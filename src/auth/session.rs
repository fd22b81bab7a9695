use super::AuthError;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tokens this close to expiry are refreshed before use, so a page request
/// does not start with a token that lapses mid-flight.
const REFRESH_MARGIN_SECS: i64 = 30;

/// A bearer token with the absolute instant it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    secret: Arc<SecretString>,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Token issued at `issued_at`, valid for `expires_in_secs` seconds.
    pub fn issued(secret: SecretString, issued_at: DateTime<Utc>, expires_in_secs: i64) -> Self {
        let expires_at = TimeDelta::try_seconds(expires_in_secs.max(0))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            secret: Arc::new(secret),
            expires_at,
        }
    }

    /// Token with no known expiry (pre-issued tokens from config).
    pub fn non_expiring(secret: SecretString) -> Self {
        Self {
            secret: Arc::new(secret),
            expires_at: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Pure comparison against the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether both handles refer to the same issued token.
    pub fn same_token(&self, other: &AccessToken) -> bool {
        Arc::ptr_eq(&self.secret, &other.secret)
    }

    pub(crate) fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Something that can mint a fresh access token.
pub trait TokenSource: Send + Sync {
    fn fetch_token(&self) -> BoxFuture<'_, Result<AccessToken, AuthError>>;
}

/// Hands out one pre-issued token.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: AccessToken,
}

impl StaticToken {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

impl TokenSource for StaticToken {
    fn fetch_token(&self) -> BoxFuture<'_, Result<AccessToken, AuthError>> {
        futures::future::ready(Ok(self.token.clone())).boxed()
    }
}

/// Cached access token shared by every feed task.
///
/// The cache lock is held across a refresh, so when several feeds find the
/// token missing at once only the first runs the exchange and the rest reuse
/// its result.
pub struct AuthSession {
    source: Arc<dyn TokenSource>,
    current: Mutex<Option<AccessToken>>,
}

impl AuthSession {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            current: Mutex::new(None),
        }
    }

    /// Return the cached token, or obtain a new one if absent or expired.
    pub async fn valid_token(&self) -> Result<AccessToken, AuthError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if !token.is_expired_at(Utc::now() + TimeDelta::seconds(REFRESH_MARGIN_SECS)) {
                return Ok(token.clone());
            }
            tracing::info!(expired_at = %token.expires_at(), "Access token expired, refreshing");
        }

        let token = self.source.fetch_token().await?;
        tracing::info!(expires_at = %token.expires_at(), "Obtained access token");
        *current = Some(token.clone());
        Ok(token)
    }

    /// Forget `rejected` if it is still the cached token, forcing the next
    /// caller to refresh.
    ///
    /// Called when the API rejects a token (HTTP 401) before its expiry. A
    /// token another feed already replaced is left alone.
    pub async fn invalidate(&self, rejected: &AccessToken) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|token| token.same_token(rejected)) {
            *current = None;
            tracing::debug!("Cached access token invalidated");
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession").finish_non_exhaustive()
    }
}
