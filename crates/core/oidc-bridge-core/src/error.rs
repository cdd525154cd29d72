//! Error taxonomy for the bridge.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported to a caller whose request could not be authenticated or authorized.
///
/// Verifier internals are logged on the server and never carried in this type.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// No `Authorization` header was sent, or it was empty.
    #[error("missing header")]
    MissingHeader,

    /// The `Authorization` header did not use the `Bearer` scheme.
    #[error("unexpected scheme")]
    UnexpectedScheme,

    /// The bearer token was rejected by the verifier.
    #[error("verification failed")]
    VerificationFailed,

    /// The identity is valid but lacks a required group.
    #[error("Insufficient groups: required {required:?}, has {has:?}")]
    InsufficientGroups {
        required: Vec<String>,
        has: Vec<String>,
    },
}

impl AuthError {
    /// `true` for failures that mean "authenticate again", as opposed to
    /// "authenticated but not allowed".
    pub fn is_unauthorized(&self) -> bool {
        !matches!(self, AuthError::InsufficientGroups { .. })
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Boxed future for async authentication operations.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = AuthResult<T>> + Send + 'a>>;

/// Fatal errors raised while initializing either half of the bridge. Never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("redirect URI is not configured")]
    MissingRedirectUri,

    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("invalid URL for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("provider discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("HTTP client could not be built: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors fetching or validating an OIDC discovery document.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discovery endpoint answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid discovery document: {0}")]
    InvalidDocument(String),

    #[error("issuer mismatch: expected {expected}, found {found}")]
    IssuerMismatch { expected: String, found: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outward_messages_carry_no_detail() {
        assert_eq!(AuthError::MissingHeader.to_string(), "missing header");
        assert_eq!(AuthError::UnexpectedScheme.to_string(), "unexpected scheme");
        assert_eq!(
            AuthError::VerificationFailed.to_string(),
            "verification failed"
        );
    }

    #[test]
    fn insufficient_groups_is_not_unauthorized() {
        let err = AuthError::InsufficientGroups {
            required: vec!["admin".to_string()],
            has: vec![],
        };
        assert!(!err.is_unauthorized());
        assert!(AuthError::VerificationFailed.is_unauthorized());
    }
}
