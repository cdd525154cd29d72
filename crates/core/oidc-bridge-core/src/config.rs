//! Static identity-provider configuration.
//!
//! Loaded once at process or module initialization and never hot-reloaded.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigurationError;
use crate::discovery::well_known_url;

/// Identity-provider settings shared by the browser controller and the API server.
///
/// Each side validates the subset it needs: [`validate_client`](Self::validate_client)
/// for the redirect flow, [`validate_server`](Self::validate_server) for bearer
/// verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderConfig {
    /// Issuer URL, e.g. `https://example.okta.com/oauth2/default`
    pub issuer: String,

    /// OAuth2 client identifier registered with the provider
    pub client_id: String,

    /// Only for confidential clients; browser clients leave this unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Absolute callback URL (`origin + fixed path`)
    pub redirect_uri: Option<String>,

    /// Where the provider sends the browser after sign-out
    pub post_logout_redirect_uri: Option<String>,

    /// JWKS endpoint; discovered from the issuer when absent
    pub jwks_uri: Option<String>,

    /// Audiences accepted on bearer tokens
    pub audiences: Vec<String>,

    /// Scopes requested on sign-in
    pub scopes: Vec<String>,

    /// Path restored after login when no original URI was captured
    pub default_original_uri: String,

    /// Lifetime of a pending redirect transaction
    pub state_ttl_seconds: u64,

    /// Timeout for calls to the provider
    pub http_timeout_seconds: u64,
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            client_id: String::new(),
            client_secret: None,
            redirect_uri: None,
            post_logout_redirect_uri: None,
            jwks_uri: None,
            audiences: Vec::new(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
            default_original_uri: "/".to_string(),
            state_ttl_seconds: 600, // 10 minutes
            http_timeout_seconds: 30,
        }
    }
}

impl IdentityProviderConfig {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = Some(uri.into());
        self
    }

    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(jwks_uri.into());
        self
    }

    pub fn with_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_original_uri(mut self, uri: impl Into<String>) -> Self {
        self.default_original_uri = uri.into();
        self
    }

    /// The parsed issuer URL.
    pub fn issuer_url(&self) -> Result<Url, ConfigurationError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("issuer"));
        }
        parse_url("issuer", &self.issuer)
    }

    /// The parsed redirect URI. Missing or empty is fatal.
    pub fn redirect_url(&self) -> Result<Url, ConfigurationError> {
        match self.redirect_uri.as_deref() {
            Some(uri) if !uri.trim().is_empty() => parse_url("redirect_uri", uri),
            _ => Err(ConfigurationError::MissingRedirectUri),
        }
    }

    /// The JWKS endpoint if one is configured explicitly.
    pub fn jwks_url(&self) -> Result<Option<Url>, ConfigurationError> {
        self.jwks_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .map(|uri| parse_url("jwks_uri", uri))
            .transpose()
    }

    /// Discovery document location for the configured issuer.
    pub fn discovery_url(&self) -> Result<Url, ConfigurationError> {
        self.issuer_url()?;
        parse_url("issuer", &well_known_url(&self.issuer))
    }

    /// Checks the settings the browser redirect flow cannot run without.
    pub fn validate_client(&self) -> Result<(), ConfigurationError> {
        self.issuer_url()?;
        if self.client_id.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("client_id"));
        }
        self.redirect_url()?;
        if let Some(uri) = self.post_logout_redirect_uri.as_deref() {
            parse_url("post_logout_redirect_uri", uri)?;
        }
        if !self.default_original_uri.starts_with('/') {
            return Err(ConfigurationError::Invalid(format!(
                "default_original_uri must be an absolute path, got {:?}",
                self.default_original_uri
            )));
        }
        Ok(())
    }

    /// Checks the settings bearer verification cannot run without.
    pub fn validate_server(&self) -> Result<(), ConfigurationError> {
        self.issuer_url()?;
        self.jwks_url()?;
        if self.audiences.iter().all(|aud| aud.trim().is_empty()) {
            return Err(ConfigurationError::MissingSetting("audiences"));
        }
        Ok(())
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigurationError> {
    Url::parse(value).map_err(|source| ConfigurationError::InvalidUrl { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_config() -> IdentityProviderConfig {
        IdentityProviderConfig::new("https://idp.example.com", "client-123")
            .with_redirect_uri("https://app.example.com/login/callback")
    }

    #[test]
    fn missing_redirect_uri_is_fatal() {
        let config = IdentityProviderConfig::new("https://idp.example.com", "client-123");
        assert!(matches!(
            config.validate_client(),
            Err(ConfigurationError::MissingRedirectUri)
        ));

        let config = config.with_redirect_uri("");
        assert!(matches!(
            config.validate_client(),
            Err(ConfigurationError::MissingRedirectUri)
        ));
    }

    #[test]
    fn client_config_validates() {
        client_config().validate_client().unwrap();
    }

    #[test]
    fn client_id_required() {
        let mut config = client_config();
        config.client_id.clear();
        assert!(matches!(
            config.validate_client(),
            Err(ConfigurationError::MissingSetting("client_id"))
        ));
    }

    #[test]
    fn default_original_uri_must_be_a_path() {
        let config = client_config().with_default_original_uri("admin");
        assert!(matches!(
            config.validate_client(),
            Err(ConfigurationError::Invalid(_))
        ));
    }

    #[test]
    fn server_config_requires_audiences() {
        let config = IdentityProviderConfig::new("https://idp.example.com", "");
        assert!(matches!(
            config.validate_server(),
            Err(ConfigurationError::MissingSetting("audiences"))
        ));

        let config = config.with_audiences(["api://default"]);
        config.validate_server().unwrap();
    }

    #[test]
    fn invalid_jwks_uri_is_reported() {
        let config = IdentityProviderConfig::new("https://idp.example.com", "")
            .with_audiences(["api://default"])
            .with_jwks_uri("not a url");
        assert!(matches!(
            config.validate_server(),
            Err(ConfigurationError::InvalidUrl {
                field: "jwks_uri",
                ..
            })
        ));
    }

    #[test]
    fn discovery_url_tolerates_trailing_slash() {
        let config = IdentityProviderConfig::new("https://idp.example.com/oauth2/default/", "");
        assert_eq!(
            config.discovery_url().unwrap().as_str(),
            "https://idp.example.com/oauth2/default/.well-known/openid-configuration"
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: IdentityProviderConfig = serde_json::from_value(serde_json::json!({
            "issuer": "https://idp.example.com",
            "audiences": ["api://default"]
        }))
        .unwrap();
        assert_eq!(config.default_original_uri, "/");
        assert_eq!(config.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(config.state_ttl_seconds, 600);
        assert!(config.redirect_uri.is_none());
    }
}
