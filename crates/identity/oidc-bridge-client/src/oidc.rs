//! OIDC authorization-code flow with PKCE, behind [`IdentityClient`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use oidc_bridge_core::{
    ConfigurationError, IdentityProviderConfig, ProviderMetadata, build_http_client, discover,
};
use reqwest::Client;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::adapter::IdentityClient;
use crate::browser::{Browser, SessionStore};
use crate::error::{ClientError, ClientResult};
use crate::state::{AuthState, AuthStateEmitter, AuthStateListener, Subscription};
use crate::tokens::{TokenResponse, TokenSet, UserInfoResponse, decode_claims};
use crate::transaction::{PkceChallenge, RedirectTransaction, TransactionStore};

const TOKEN_KEY: &str = "oidc-bridge.tokens";

/// Identity client for any OpenID Connect provider.
///
/// Runs the authorization-code flow as a public client: PKCE (S256) when the
/// provider supports it, a per-redirect `nonce`, and tokens kept in session
/// storage for the lifetime of the tab.
pub struct OidcClient {
    config: IdentityProviderConfig,
    metadata: ProviderMetadata,
    redirect_uri: String,
    use_pkce: bool,
    http_client: Client,
    browser: Arc<dyn Browser>,
    session: Arc<dyn SessionStore>,
    transactions: TransactionStore,
    auth_state: AuthStateEmitter,
}

impl OidcClient {
    /// Builds a client from known provider endpoints.
    pub fn new(
        config: IdentityProviderConfig,
        metadata: ProviderMetadata,
        browser: Arc<dyn Browser>,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self, ConfigurationError> {
        config.validate_client()?;
        // Sent verbatim; providers compare it byte for byte.
        let redirect_uri = config.redirect_url()?;
        let redirect_uri = config
            .redirect_uri
            .clone()
            .unwrap_or_else(|| redirect_uri.into());

        for (field, endpoint) in [
            ("authorization_endpoint", &metadata.authorization_endpoint),
            ("token_endpoint", &metadata.token_endpoint),
        ] {
            Url::parse(endpoint).map_err(|source| ConfigurationError::InvalidUrl { field, source })?;
        }

        let http_client = build_http_client(Duration::from_secs(config.http_timeout_seconds))?;
        let use_pkce = metadata.supports_pkce_s256();
        if !use_pkce {
            warn!("Provider {} does not advertise S256 PKCE", metadata.issuer);
        }

        Ok(Self {
            transactions: TransactionStore::new(Arc::clone(&session)),
            config,
            metadata,
            redirect_uri,
            use_pkce,
            http_client,
            browser,
            session,
            auth_state: AuthStateEmitter::new(),
        })
    }

    /// Builds a client from the issuer's discovery document.
    pub async fn discover(
        config: IdentityProviderConfig,
        browser: Arc<dyn Browser>,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self, ConfigurationError> {
        config.validate_client()?;
        let http_client = build_http_client(Duration::from_secs(config.http_timeout_seconds))?;
        let metadata = discover(&http_client, &config.issuer).await?;
        info!("Discovered OIDC endpoints for issuer {}", config.issuer);

        Self::new(config, metadata, browser, session)
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Starts a sign-in transaction and returns the authorization URL for it.
    pub fn authorization_url(&self, original_uri: Option<&str>) -> ClientResult<String> {
        let pkce = self.use_pkce.then(PkceChallenge::new);
        let transaction = RedirectTransaction::new(
            self.redirect_uri.clone(),
            pkce.as_ref().map(|p| p.code_verifier.clone()),
            original_uri.map(str::to_string),
            self.config.state_ttl_seconds,
        );
        self.transactions.store(&transaction)?;

        let mut url = Url::parse(&self.metadata.authorization_endpoint)?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &transaction.redirect_uri);
            params.append_pair("state", &transaction.state);
            params.append_pair("nonce", &transaction.nonce);

            if !self.config.scopes.is_empty() {
                params.append_pair("scope", &self.config.scopes.join(" "));
            }

            if let Some(pkce) = &pkce {
                params.append_pair("code_challenge", &pkce.code_challenge);
                params.append_pair("code_challenge_method", &pkce.code_challenge_method);
            }
        }

        debug!("Generated authorization URL for issuer {}", self.metadata.issuer);
        Ok(url.to_string())
    }

    /// URL that ends the provider session, or the post-logout page when the
    /// provider has no end-session endpoint.
    pub fn logout_url(&self, id_token_hint: Option<&str>) -> ClientResult<String> {
        let post_logout = match &self.config.post_logout_redirect_uri {
            Some(uri) => uri.clone(),
            None => self.browser.origin()?,
        };

        let Some(endpoint) = &self.metadata.end_session_endpoint else {
            return Ok(post_logout);
        };

        let mut url = Url::parse(endpoint)?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &self.config.client_id);
            if let Some(hint) = id_token_hint {
                params.append_pair("id_token_hint", hint);
            }
            params.append_pair("post_logout_redirect_uri", &post_logout);
        }

        Ok(url.to_string())
    }

    fn load_tokens(&self) -> ClientResult<Option<TokenSet>> {
        let Some(value) = self.session.get(TOKEN_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str(&value) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                warn!("Discarding unreadable stored tokens: {}", e);
                self.session.remove(TOKEN_KEY)?;
                Ok(None)
            }
        }
    }

    fn save_tokens(&self, tokens: &TokenSet) -> ClientResult<()> {
        self.session.set(TOKEN_KEY, &serde_json::to_string(tokens)?)
    }

    /// Stored tokens that have not expired. Expired tokens are removed.
    fn live_tokens(&self) -> ClientResult<Option<TokenSet>> {
        match self.load_tokens()? {
            Some(tokens) if tokens.is_expired(Utc::now()) => {
                debug!("Stored tokens have expired");
                self.session.remove(TOKEN_KEY)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Like [`live_tokens`](Self::live_tokens), but flips an authenticated
    /// state to unauthenticated when the session is gone.
    fn session_tokens(&self) -> ClientResult<Option<TokenSet>> {
        let tokens = self.live_tokens()?;
        if tokens.is_none() && self.auth_state.current().is_some_and(|s| s.is_authenticated) {
            info!("Session expired");
            self.auth_state.publish(AuthState::unauthenticated());
        }
        Ok(tokens)
    }

    async fn exchange_code(
        &self,
        code: &str,
        transaction: &RedirectTransaction,
    ) -> ClientResult<TokenResponse> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", self.config.client_id.as_str());
        params.insert("redirect_uri", transaction.redirect_uri.as_str());

        if let Some(verifier) = transaction.code_verifier.as_deref() {
            params.insert("code_verifier", verifier);
        }

        if let Some(secret) = self.config.client_secret.as_deref() {
            params.insert("client_secret", secret);
        }

        let response = self
            .http_client
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {}", error_text);
            return Err(ClientError::TokenExchangeFailed(error_text));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidTokenResponse(e.to_string()))?;

        info!("Successfully exchanged code for tokens");
        Ok(token_response)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl IdentityClient for OidcClient {
    fn config(&self) -> &IdentityProviderConfig {
        &self.config
    }

    fn subscribe_auth_state(&self, listener: AuthStateListener) -> Subscription {
        self.auth_state.subscribe(listener)
    }

    fn auth_state(&self) -> Option<AuthState> {
        self.auth_state.current()
    }

    fn start(&self) {
        if let Err(e) = self.transactions.cleanup_expired() {
            warn!("Could not clean up sign-in transactions: {}", e);
        }

        let state = match self.live_tokens() {
            Ok(Some(tokens)) => AuthState::authenticated(tokens.claims()),
            Ok(None) => AuthState::unauthenticated(),
            Err(e) => {
                warn!("Could not read stored tokens: {}", e);
                AuthState::unauthenticated()
            }
        };

        debug!("Resolved initial auth state: authenticated={}", state.is_authenticated);
        self.auth_state.publish(state);
    }

    async fn sign_in_with_redirect(&self, original_uri: Option<&str>) -> ClientResult<()> {
        let url = self.authorization_url(original_uri)?;
        info!("Redirecting to identity provider {}", self.metadata.issuer);
        self.browser.navigate(&url)
    }

    async fn handle_callback(&self, callback_url: &str) -> ClientResult<Option<String>> {
        let url = Url::parse(callback_url)?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let state = params
            .get("state")
            .ok_or_else(|| ClientError::InvalidCallback("missing state parameter".to_string()))?;
        let transaction = self.transactions.take(state)?;

        if let Some(error) = params.get("error") {
            let description = params
                .get("error_description")
                .map(String::as_str)
                .unwrap_or("No description");
            return Err(ClientError::Callback(format!("{}: {}", error, description)));
        }

        let code = params
            .get("code")
            .ok_or(ClientError::MissingAuthorizationCode)?;

        let tokens = TokenSet::from_response(self.exchange_code(code, &transaction).await?, Utc::now());

        if let Some(id_token) = tokens.id_token.as_deref() {
            let claims = decode_claims(id_token)?;
            let nonce = claims.get("nonce").and_then(serde_json::Value::as_str);
            if nonce != Some(transaction.nonce.as_str()) {
                return Err(ClientError::NonceMismatch);
            }
        }

        self.save_tokens(&tokens)?;
        info!("Sign-in callback completed");
        self.auth_state
            .publish(AuthState::authenticated(tokens.claims()));

        Ok(transaction.original_uri)
    }

    async fn sign_out(&self) -> ClientResult<()> {
        let tokens = self.load_tokens()?;
        self.session.remove(TOKEN_KEY)?;

        let url = self.logout_url(tokens.as_ref().and_then(|t| t.id_token.as_deref()))?;
        info!("Signing out");
        self.browser.navigate(&url)
    }

    async fn get_access_token(&self) -> ClientResult<Option<String>> {
        Ok(self.session_tokens()?.map(|tokens| tokens.access_token))
    }

    async fn get_user(&self) -> ClientResult<UserInfoResponse> {
        let tokens = self.session_tokens()?.ok_or(ClientError::NotAuthenticated)?;

        let Some(userinfo_endpoint) = &self.metadata.userinfo_endpoint else {
            let id_token = tokens
                .id_token
                .as_deref()
                .ok_or_else(|| ClientError::UserInfoFailed("no userinfo endpoint or ID token".to_string()))?;
            let claims = decode_claims(id_token)?;
            return serde_json::from_value(claims)
                .map_err(|e| ClientError::UserInfoFailed(e.to_string()));
        };

        let response = self
            .http_client
            .get(userinfo_endpoint)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("User info request failed: {}", error_text);
            return Err(ClientError::UserInfoFailed(error_text));
        }

        let user_info: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| ClientError::UserInfoFailed(e.to_string()))?;

        debug!("Retrieved user info for subject: {}", user_info.sub);
        Ok(user_info)
    }
}
