//! Verifier-internal failures.
//!
//! These never reach the caller: the authenticator logs them and answers
//! [`AuthError::VerificationFailed`](oidc_bridge_core::AuthError::VerificationFailed).

use jsonwebtoken::Algorithm;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("no signing key for kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("algorithm {0:?} not allowed for the signing key")]
    UnsupportedAlgorithm(Algorithm),

    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),

    #[error("claim {claim} does not match the expected value")]
    ClaimMismatch { claim: String },

    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    #[error("JWKS request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JWKS endpoint answered {status}")]
    JwksStatus { status: u16 },

    #[error("invalid JWKS document: {0}")]
    InvalidJwks(String),
}

impl VerificationError {
    /// Failures to reach the key set, as opposed to a bad token.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            VerificationError::Transport(_)
                | VerificationError::JwksStatus { .. }
                | VerificationError::InvalidJwks(_)
        )
    }
}
