//! Browser half of the OIDC bridge.
//!
//! - [`RedirectAuthController`] gates a protected area of the UI: it waits for
//!   the session to resolve, starts at most one sign-in redirect, completes the
//!   callback and restores the page the user was on.
//! - [`IdentityClient`] is the provider capability the controller consumes;
//!   [`OidcClient`] implements it with the authorization-code flow and PKCE.
//! - [`IdentityAuthProvider`] exposes the session to the hosted UI as an
//!   [`AuthProvider`].
//!
//! On `wasm32` the `WebBrowser` and `WebSessionStorage` types bind the browser
//! traits to `window.location`, `window.history` and `sessionStorage`.

mod adapter;
mod bridge;
mod browser;
mod controller;
mod error;
mod oidc;
mod state;
mod tokens;
mod transaction;
#[cfg(target_arch = "wasm32")]
mod web;


pub use adapter::IdentityClient;
pub use bridge::{AuthProvider, CredentialModes, IdentityAuthProvider, UserInfo};
pub use browser::{Browser, MemorySessionStore, SessionStore};
pub use controller::{
    Action, Phase, Reaction, RedirectAuthController, Render, View, restore_original_uri,
    to_relative_url,
};
pub use error::{ClientError, ClientResult};
pub use oidc::OidcClient;
pub use state::{AuthState, AuthStateEmitter, AuthStateListener, Subscription};
pub use tokens::{TokenResponse, TokenSet, UserInfoResponse, decode_claims};
pub use transaction::{PkceChallenge, RedirectTransaction, TransactionStore};
#[cfg(target_arch = "wasm32")]
pub use web::{WebBrowser, WebSessionStorage};

// Re-export shared types for convenience
pub use oidc_bridge_core::{ConfigurationError, IdentityProviderConfig, ProviderMetadata};
