use super::session::{AccessToken, TokenSource};
use super::AuthError;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::USER_AGENT;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Everything the authorization-code exchange needs to know.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Host serving `/api/v1/authorize` and `/api/v1/access_token`
    pub auth_base_uri: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    /// Authorize URL with `{client_id}` and `{redirect_uri}` placeholders
    pub authorize_url_template: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

/// Obtains an authorization code from the user.
///
/// Implementations send the user to `authorize_url` and return the `code`
/// the provider hands back on the redirect.
pub trait CodePrompt: Send + Sync {
    fn authorization_code<'a>(
        &'a self,
        authorize_url: &'a Url,
    ) -> BoxFuture<'a, Result<String, AuthError>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

/// Fill the authorize URL template.
///
/// Both values are percent-encoded before substitution, so a redirect URI like
/// `http://localhost:8080/cb` becomes `http%3A%2F%2Flocalhost%3A8080%2Fcb`.
pub fn authorize_url(template: &str, client_id: &str, redirect_uri: &str) -> Result<Url, AuthError> {
    let filled = template
        .replace("{client_id}", &encode(client_id))
        .replace("{redirect_uri}", &encode(redirect_uri));
    Url::parse(&filled).map_err(|e| AuthError::InvalidUrl(format!("{filled}: {e}")))
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Pull the authorization code out of the URL the provider redirected to.
///
/// An `error` parameter (e.g. `access_denied`) wins over a code.
pub fn extract_code(redirect_url: &str) -> Result<String, AuthError> {
    let url = Url::parse(redirect_url.trim())
        .map_err(|e| AuthError::InvalidUrl(format!("redirect URL: {e}")))?;

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => return Err(AuthError::Rejected(value.into_owned())),
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            _ => {}
        }
    }
    code.ok_or(AuthError::MissingCode)
}

/// Authorization-code grant: prompt for a code, then trade it for a token.
pub struct CodeExchange {
    client: reqwest::Client,
    settings: OAuthSettings,
    prompt: Arc<dyn CodePrompt>,
}

impl CodeExchange {
    pub fn new(client: reqwest::Client, settings: OAuthSettings, prompt: Arc<dyn CodePrompt>) -> Self {
        Self {
            client,
            settings,
            prompt,
        }
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/api/v1/access_token",
            self.settings.auth_base_uri.as_str().trim_end_matches('/')
        )
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Http`] / [`AuthError::Timeout`] - the endpoint could not be reached
    /// - [`AuthError::Status`] - non-2xx response
    /// - [`AuthError::Rejected`] - 2xx response carrying `{"error": ...}`
    /// - [`AuthError::Decode`] - body is not a token response
    pub async fn exchange(&self, code: &str) -> Result<AccessToken, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];

        let request = self
            .client
            .post(self.token_endpoint())
            .basic_auth(
                &self.settings.client_id,
                Some(self.settings.client_secret.expose_secret()),
            )
            .header(USER_AGENT, &self.settings.user_agent)
            .form(&form);

        let response = tokio::time::timeout(self.settings.request_timeout, request.send())
            .await
            .map_err(|_| AuthError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(AuthError::Status(status.as_u16()));
        }

        let issued_at = Utc::now();
        let body = response.bytes().await?;
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| AuthError::Decode(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(AuthError::Rejected(error));
        }
        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Decode("missing access_token".to_string()))?;

        Ok(AccessToken::issued(
            SecretString::from(access_token),
            issued_at,
            parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
        ))
    }
}

impl TokenSource for CodeExchange {
    fn fetch_token(&self) -> BoxFuture<'_, Result<AccessToken, AuthError>> {
        async move {
            let url = authorize_url(
                &self.settings.authorize_url_template,
                &self.settings.client_id,
                &self.settings.redirect_uri,
            )?;
            let code = self.prompt.authorization_code(&url).await?;
            tracing::debug!("Authorization code received, exchanging for token");
            self.exchange(&code).await
        }
        .boxed()
    }
}
