//! `AuthProvider` capability for the hosted UI, backed by an [`IdentityClient`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapter::IdentityClient;
use crate::error::{ClientError, ClientResult};

/// How the hosted UI should attach credentials to outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialModes {
    pub add_credentials_to_request: bool,
    pub add_token_to_request: bool,
    pub add_username_to_request: bool,
}

impl CredentialModes {
    pub const BEARER_TOKEN: Self = Self {
        add_credentials_to_request: false,
        add_token_to_request: true,
        add_username_to_request: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
}

/// Authentication capability consumed by the hosted UI.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait AuthProvider: Send + Sync {
    fn credential_modes(&self) -> CredentialModes;

    async fn get_access_token(&self) -> ClientResult<Option<String>>;

    async fn get_user_info(&self) -> ClientResult<UserInfo>;

    async fn login_if_needed(&self) -> ClientResult<()>;

    async fn log_out(&self) -> ClientResult<()>;

    fn is_authenticated(&self) -> bool;

    fn is_loading(&self) -> bool;

    fn error(&self) -> Option<&ClientError>;
}

/// [`AuthProvider`] over an identity client.
///
/// Only mounted inside the protected area, so the session is always
/// established: it reports authenticated, never loading, no error.
#[derive(Clone)]
pub struct IdentityAuthProvider {
    client: Arc<dyn IdentityClient>,
}

impl IdentityAuthProvider {
    pub fn new(client: Arc<dyn IdentityClient>) -> Self {
        Self { client }
    }

    /// Adds the current access token as a bearer credential.
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<reqwest::RequestBuilder> {
        match self.client.get_access_token().await? {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(ClientError::NotAuthenticated),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl AuthProvider for IdentityAuthProvider {
    fn credential_modes(&self) -> CredentialModes {
        CredentialModes::BEARER_TOKEN
    }

    async fn get_access_token(&self) -> ClientResult<Option<String>> {
        self.client.get_access_token().await
    }

    async fn get_user_info(&self) -> ClientResult<UserInfo> {
        let user = self.client.get_user().await?;
        Ok(UserInfo { id: user.sub })
    }

    async fn login_if_needed(&self) -> ClientResult<()> {
        warn!("login_if_needed called inside the protected area");
        self.client.sign_in_with_redirect(None).await
    }

    async fn log_out(&self) -> ClientResult<()> {
        self.client.sign_out().await
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    fn is_loading(&self) -> bool {
        false
    }

    fn error(&self) -> Option<&ClientError> {
        None
    }
}
