//! Bearer-token management for the listing API.
//!
//! - `session` - [`AuthSession`], the cached, self-refreshing token every feed asks for
//! - `oauth` - the authorization-code exchange against `/api/v1/access_token`
//!
//! Obtaining the authorization code itself (sending the user to a browser and
//! reading back the redirect) is behind the [`CodePrompt`] trait so the core
//! never touches the terminal.

mod oauth;
mod session;

use thiserror::Error;

pub use oauth::{authorize_url, extract_code, CodeExchange, CodePrompt, OAuthSettings};
pub use session::{AccessToken, AuthSession, StaticToken, TokenSource};

/// Errors raised while obtaining or refreshing an access token.
///
/// These are fatal for the feed that asked for the token, never for the process;
/// a later feed request retries the exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Network-level failure talking to the token endpoint
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Token endpoint did not answer in time
    #[error("Token request timed out")]
    Timeout,
    /// Token endpoint answered with a non-2xx status
    #[error("Token endpoint returned HTTP {0}")]
    Status(u16),
    /// The provider refused the grant (`{"error": "..."}` or `?error=` on the redirect)
    #[error("Authorization rejected: {0}")]
    Rejected(String),
    /// Token response was not the expected JSON shape
    #[error("Invalid token response: {0}")]
    Decode(String),
    /// Redirect URL did not carry a `code` parameter
    #[error("Redirect URL carries no authorization code")]
    MissingCode,
    /// Authorization URL (template or redirect) could not be parsed
    #[error("Invalid authorization URL: {0}")]
    InvalidUrl(String),
    /// The interactive collaborator failed to supply a code
    #[error("Authorization prompt failed: {0}")]
    Prompt(String),
}
