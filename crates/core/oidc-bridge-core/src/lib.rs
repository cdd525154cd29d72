//! Core types shared by the browser and server halves of the OIDC bridge.
//!
//! This crate provides:
//! - `AuthError`, the outward-facing authentication failure reported to callers
//! - `ConfigurationError`, the fatal error raised while setting up either side
//! - `IdentityProviderConfig`, the static identity-provider configuration surface
//! - `ProviderMetadata` and [`discover`] for OIDC discovery documents

mod config;
mod discovery;
mod error;

pub use config::IdentityProviderConfig;
pub use discovery::{ProviderMetadata, build_http_client, discover, well_known_url};
pub use error::{AuthError, AuthFuture, AuthResult, ConfigurationError, DiscoveryError};
