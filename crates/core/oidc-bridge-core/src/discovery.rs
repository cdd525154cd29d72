//! OIDC discovery documents.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DiscoveryError;

/// OpenID provider metadata as published at `/.well-known/openid-configuration`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
    pub scopes_supported: Option<Vec<String>>,
    pub response_types_supported: Option<Vec<String>>,
    pub grant_types_supported: Option<Vec<String>>,
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

impl ProviderMetadata {
    /// Whether the provider advertises S256 PKCE. Providers that omit the
    /// field are assumed to support it.
    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_none_or(|methods| methods.iter().any(|m| m == "S256"))
    }
}

/// Location of the discovery document for `issuer`.
pub fn well_known_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

/// Builds the HTTP client used to talk to the provider.
#[cfg(not(target_arch = "wasm32"))]
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Builds the HTTP client used to talk to the provider.
///
/// Browsers own request timeouts, so `timeout` is ignored on wasm.
#[cfg(target_arch = "wasm32")]
pub fn build_http_client(_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().build()
}

/// Fetches and validates the discovery document for `issuer`.
///
/// The document's `issuer` must match the configured one (ignoring a trailing slash).
pub async fn discover(
    http: &reqwest::Client,
    issuer: &str,
) -> Result<ProviderMetadata, DiscoveryError> {
    let url = well_known_url(issuer);
    debug!("Fetching discovery document from {}", url);

    let response = http.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DiscoveryError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .map_err(|e| DiscoveryError::InvalidDocument(e.to_string()))?;

    if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(DiscoveryError::IssuerMismatch {
            expected: issuer.to_string(),
            found: metadata.issuer,
        });
    }

    Ok(metadata)
}
