//! Client-side error types.

use oidc_bridge_core::ConfigurationError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("State not found or expired")]
    StateNotFound,

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Provider returned an error: {0}")]
    Callback(String),

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("ID token nonce does not match the pending sign-in")]
    NonceMismatch,

    #[error("User info request failed: {0}")]
    UserInfoFailed(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}
