//! The per-request bearer-token authenticator plugged into the host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use oidc_bridge_core::{
    AuthError, AuthFuture, ConfigurationError, IdentityProviderConfig, build_http_client, discover,
};
use tracing::{debug, error, info, warn};

use crate::header::bearer_token;
use crate::identity::{GroupMapper, StaticGroups, VerifiedIdentity};
use crate::jwks::JwksCache;
use crate::verifier::{JwtVerifier, TokenVerifier, VerifierSettings};

/// Authenticator contract the host calls for every protected request.
#[async_trait]
pub trait CustomAuthenticator: Send + Sync + 'static {
    /// One-time setup before the host starts serving. Errors are fatal.
    async fn initialize(&mut self) -> Result<(), ConfigurationError>;

    /// Resolves the caller of a request from its headers.
    fn authenticate<'a>(&'a self, headers: &'a HeaderMap) -> AuthFuture<'a, VerifiedIdentity>;
}

/// [`CustomAuthenticator`] for `Authorization: Bearer <jwt>` access tokens.
pub struct BearerAuthenticator {
    config: IdentityProviderConfig,
    settings: VerifierSettings,
    group_mapper: Arc<dyn GroupMapper>,
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl BearerAuthenticator {
    /// An authenticator that builds a [`JwtVerifier`] during
    /// [`initialize`](CustomAuthenticator::initialize). Every caller gets no
    /// groups until [`with_group_mapper`](Self::with_group_mapper) is used.
    pub fn new(config: IdentityProviderConfig) -> Self {
        Self {
            config,
            settings: VerifierSettings::default(),
            group_mapper: Arc::new(StaticGroups::default()),
            verifier: None,
        }
    }

    /// An authenticator backed by an existing verifier.
    pub fn with_verifier(config: IdentityProviderConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier: Some(verifier),
            ..Self::new(config)
        }
    }

    pub fn with_settings(mut self, settings: VerifierSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_group_mapper(mut self, group_mapper: Arc<dyn GroupMapper>) -> Self {
        self.group_mapper = group_mapper;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.verifier.is_some()
    }

    async fn resolve_jwks_uri(
        &self,
        http_client: &reqwest::Client,
    ) -> Result<String, ConfigurationError> {
        if let Some(url) = self.config.jwks_url()? {
            return Ok(url.to_string());
        }

        let metadata = discover(http_client, &self.config.issuer).await?;
        info!("Discovered JWKS endpoint for issuer {}", self.config.issuer);
        metadata
            .jwks_uri
            .ok_or(ConfigurationError::MissingSetting("jwks_uri"))
    }
}

#[async_trait]
impl CustomAuthenticator for BearerAuthenticator {
    async fn initialize(&mut self) -> Result<(), ConfigurationError> {
        self.config.validate_server()?;

        if self.verifier.is_some() {
            return Ok(());
        }

        let http_client =
            build_http_client(Duration::from_secs(self.config.http_timeout_seconds))?;
        let jwks_uri = self.resolve_jwks_uri(&http_client).await?;

        let keys = JwksCache::new(http_client, jwks_uri.clone()).with_refresh_interval(
            Duration::from_secs(self.settings.jwks_refresh_interval_seconds),
        );
        let verifier = JwtVerifier::new(self.config.issuer.clone(), keys).with_settings(&self.settings);
        self.verifier = Some(Arc::new(verifier));

        info!(
            "Bearer authenticator ready for issuer {} (JWKS {}, audiences {:?})",
            self.config.issuer, jwks_uri, self.config.audiences
        );
        Ok(())
    }

    fn authenticate<'a>(&'a self, headers: &'a HeaderMap) -> AuthFuture<'a, VerifiedIdentity> {
        Box::pin(async move {
            let token = bearer_token(headers)?;

            let Some(verifier) = &self.verifier else {
                error!("Bearer authenticator used before initialize()");
                return Err(AuthError::VerificationFailed);
            };

            let claims = match verifier
                .verify_access_token(token, &self.config.audiences)
                .await
            {
                Ok(claims) => claims,
                Err(e) if e.is_transport() => {
                    error!("Could not load signing keys: {}", e);
                    return Err(AuthError::VerificationFailed);
                }
                Err(e) => {
                    warn!("Bearer token rejected: {}", e);
                    return Err(AuthError::VerificationFailed);
                }
            };

            let groups = self.group_mapper.groups_for(&claims).await;
            let identity = VerifiedIdentity::from_claims(&claims, groups);
            debug!("Authenticated {} with groups {:?}", identity.id(), identity.groups());
            Ok(identity)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubVerifier;
    use super::*;
    use crate::identity::{ClaimGroups, claims_for};
    use crate::verifier::testing::{AUDIENCE, ISSUER, JWKS, access_token_claims, sign};
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;
    use std::collections::BTreeSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> IdentityProviderConfig {
        IdentityProviderConfig::new(ISSUER, "spa-client")
            .with_audiences([AUDIENCE])
            .with_jwks_uri("https://idp.example.com/oauth2/default/v1/keys")
    }

    fn stub_authenticator() -> BearerAuthenticator {
        let verifier = StubVerifier {
            claims: claims_for("00u1abcd", serde_json::json!({"groups": ["admin"]})),
        };
        BearerAuthenticator::with_verifier(config(), Arc::new(verifier))
            .with_group_mapper(Arc::new(StaticGroups::new(["users"])))
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_missing_header() {
        let authenticator = stub_authenticator();
        let result = authenticator.authenticate(&HeaderMap::new()).await;
        assert_eq!(result, Err(AuthError::MissingHeader));
    }

    #[tokio::test]
    async fn test_basic_scheme() {
        let authenticator = stub_authenticator();
        let result = authenticator.authenticate(&headers("Basic xyz")).await;
        assert_eq!(result, Err(AuthError::UnexpectedScheme));
    }

    #[tokio::test]
    async fn test_accepted_token() {
        let authenticator = stub_authenticator();
        let identity = authenticator
            .authenticate(&headers("Bearer valid-token"))
            .await
            .unwrap();

        assert_eq!(identity.id(), "00u1abcd");
        assert_eq!(identity.groups(), &BTreeSet::from(["users".to_string()]));
        assert!(identity.apps().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let authenticator = stub_authenticator();
        assert_eq!(
            authenticator.authenticate(&headers("Bearer forged")).await,
            Err(AuthError::VerificationFailed)
        );
        assert_eq!(
            authenticator
                .authenticate(&headers("Bearer offline-token"))
                .await,
            Err(AuthError::VerificationFailed)
        );
    }

    #[tokio::test]
    async fn test_claim_group_mapping() {
        let authenticator =
            stub_authenticator().with_group_mapper(Arc::new(ClaimGroups::new("groups")));
        let identity = authenticator
            .authenticate(&headers("Bearer valid-token"))
            .await
            .unwrap();
        assert!(identity.in_group("admin"));
        assert!(!identity.in_group("users"));
    }

    #[tokio::test]
    async fn test_uninitialized_authenticator_rejects() {
        let authenticator = BearerAuthenticator::new(config());
        assert!(!authenticator.is_initialized());
        assert_eq!(
            authenticator.authenticate(&headers("Bearer valid-token")).await,
            Err(AuthError::VerificationFailed)
        );
    }

    #[tokio::test]
    async fn test_initialize_requires_audiences() {
        let mut authenticator =
            BearerAuthenticator::new(IdentityProviderConfig::new(ISSUER, "spa-client"));
        assert!(matches!(
            authenticator.initialize().await,
            Err(ConfigurationError::MissingSetting("audiences"))
        ));

        let mut authenticator = BearerAuthenticator::new(
            IdentityProviderConfig::new("", "spa-client").with_audiences([AUDIENCE]),
        );
        assert!(matches!(
            authenticator.initialize().await,
            Err(ConfigurationError::MissingSetting("issuer"))
        ));
    }

    #[tokio::test]
    async fn test_initialize_discovers_jwks_and_verifies() {
        let server = MockServer::start().await;
        let issuer = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/authorize"),
                "token_endpoint": format!("{issuer}/token"),
                "jwks_uri": format!("{issuer}/v1/keys")
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/keys"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::from_str::<serde_json::Value>(JWKS).unwrap()),
            )
            .mount(&server)
            .await;

        let config = IdentityProviderConfig::new(issuer.clone(), "spa-client").with_audiences([AUDIENCE]);
        let mut authenticator = BearerAuthenticator::new(config)
            .with_group_mapper(Arc::new(ClaimGroups::new("groups")));
        authenticator.initialize().await.unwrap();
        assert!(authenticator.is_initialized());

        let mut claims = access_token_claims("00u1abcd");
        claims["iss"] = issuer.into();
        let token = sign(&claims);

        let identity = authenticator
            .authenticate(&headers(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(identity.id(), "00u1abcd");
        assert!(identity.in_group("admin"));
    }

    #[tokio::test]
    async fn test_initialize_fails_when_discovery_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = IdentityProviderConfig::new(server.uri(), "spa-client").with_audiences([AUDIENCE]);
        let mut authenticator = BearerAuthenticator::new(config);
        assert!(matches!(
            authenticator.initialize().await,
            Err(ConfigurationError::Discovery(_))
        ));
    }
}
