//! Server half of the OIDC bridge.
//!
//! Every request to a protected API carries `Authorization: Bearer <token>`.
//! The [`BearerAuthenticator`] verifies the token against the provider's JWKS
//! and the configured audiences, maps it to a [`VerifiedIdentity`], and the
//! axum middleware attaches that identity to the request or answers 401.
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use oidc_bridge_server::{
//!     BearerAuthenticator, CustomAuthenticator, HostConfig, IdentityProviderConfig,
//!     SharedAuthenticator, router, start,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = IdentityProviderConfig::new("https://example.okta.com/oauth2/default", "client-id")
//!     .with_audiences(["api://default"]);
//! let mut authenticator = BearerAuthenticator::new(config);
//! authenticator.initialize().await?;
//! let authenticator: SharedAuthenticator = Arc::new(authenticator);
//!
//! let api = Router::new().route("/ping", get(|| async { "pong" }));
//! let host = HostConfig::default();
//! let app = router(&host, Some(authenticator), api)?;
//! start(&host, app).await?;
//! # Ok(())
//! # }
//! ```

mod authenticator;
mod error;
mod header;
mod host;
mod identity;
mod jwks;
mod middleware;
mod verifier;

pub use authenticator::{BearerAuthenticator, CustomAuthenticator};
pub use error::VerificationError;
pub use header::{Credential, bearer_token, parse_authorization};
pub use host::{AuthMethod, CorsConfig, HostConfig, router, start};
pub use identity::{ClaimGroups, GroupMapper, StaticGroups, VerifiedClaims, VerifiedIdentity};
pub use jwks::{DEFAULT_REFRESH_INTERVAL, JwksCache, KeyFamily, SigningKey};
pub use middleware::{AuthRejection, SharedAuthenticator, require_groups, require_identity};
pub use verifier::{JwtVerifier, TokenVerifier, VerifierSettings};

// Re-export shared types for convenience
pub use oidc_bridge_core::{AuthError, AuthResult, ConfigurationError, IdentityProviderConfig};
