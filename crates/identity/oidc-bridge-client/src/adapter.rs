//! The identity-provider client capability the controller and bridge depend on.
//!
//! Any provider SDK can sit behind [`IdentityClient`]; [`crate::OidcClient`]
//! is the implementation for standards-compliant OIDC providers.

use async_trait::async_trait;
use oidc_bridge_core::IdentityProviderConfig;

use crate::error::ClientResult;
use crate::state::{AuthState, AuthStateListener, Subscription};
use crate::tokens::UserInfoResponse;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait IdentityClient: Send + Sync {
    /// Static provider configuration (issuer, client id, redirect URI, ...)
    fn config(&self) -> &IdentityProviderConfig;

    /// Registers `listener` for auth-state changes. The listener is called
    /// immediately with the current state; dropping the returned
    /// [`Subscription`] unsubscribes.
    fn subscribe_auth_state(&self, listener: AuthStateListener) -> Subscription;

    /// The latest published state, `None` until the client has resolved the session.
    fn auth_state(&self) -> Option<AuthState>;

    /// Resolves the session from local storage and publishes the first state.
    fn start(&self);

    /// Navigates the browser to the provider's authorization endpoint.
    /// `original_uri` is round-tripped and handed back by [`handle_callback`](Self::handle_callback).
    async fn sign_in_with_redirect(&self, original_uri: Option<&str>) -> ClientResult<()>;

    /// Completes a sign-in from the callback URL the provider redirected to.
    /// Returns the original URI captured when the redirect started.
    async fn handle_callback(&self, callback_url: &str) -> ClientResult<Option<String>>;

    /// Ends the session and navigates to the provider's sign-out page.
    async fn sign_out(&self) -> ClientResult<()>;

    /// The current access token, or `None` if there is no live session.
    async fn get_access_token(&self) -> ClientResult<Option<String>>;

    /// Profile of the signed-in user.
    async fn get_user(&self) -> ClientResult<UserInfoResponse>;
}
