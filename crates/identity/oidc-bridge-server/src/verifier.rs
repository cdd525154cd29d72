//! Access-token verification against the provider's signing keys.

use std::collections::BTreeMap;

use async_trait::async_trait;
use jsonwebtoken::{Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VerificationError;
use crate::identity::VerifiedClaims;
use crate::jwks::JwksCache;

/// Verifies an access token for one of `audiences`.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_access_token(
        &self,
        token: &str,
        audiences: &[String],
    ) -> Result<VerifiedClaims, VerificationError>;
}

/// Tunables for [`JwtVerifier`] and its key cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Clock skew tolerated on `exp` and `nbf`
    pub leeway_seconds: u64,

    /// Minimum time between JWKS refetches triggered by unknown key ids
    pub jwks_refresh_interval_seconds: u64,

    /// Claims that must equal the given string, e.g. `cid = "<client id>"`
    pub claim_assertions: BTreeMap<String, String>,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            leeway_seconds: 60,
            jwks_refresh_interval_seconds: 60,
            claim_assertions: BTreeMap::new(),
        }
    }
}

/// Verifies signed JWT access tokens: signature against the JWKS, `exp`/`nbf`
/// with leeway, issuer, audience and any configured claim assertions.
pub struct JwtVerifier {
    issuer: String,
    keys: JwksCache,
    leeway_seconds: u64,
    claim_assertions: BTreeMap<String, String>,
}

impl JwtVerifier {
    pub fn new(issuer: impl Into<String>, keys: JwksCache) -> Self {
        let defaults = VerifierSettings::default();
        Self {
            issuer: issuer.into(),
            keys,
            leeway_seconds: defaults.leeway_seconds,
            claim_assertions: defaults.claim_assertions,
        }
    }

    pub fn with_settings(mut self, settings: &VerifierSettings) -> Self {
        self.leeway_seconds = settings.leeway_seconds;
        self.claim_assertions = settings.claim_assertions.clone();
        self
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_claim_assertion(mut self, claim: impl Into<String>, value: impl Into<String>) -> Self {
        self.claim_assertions.insert(claim.into(), value.into());
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify_access_token(
        &self,
        token: &str,
        audiences: &[String],
    ) -> Result<VerifiedClaims, VerificationError> {
        let header = decode_header(token).map_err(|e| VerificationError::Malformed(e.to_string()))?;
        let key = self.keys.key(header.kid.as_deref()).await?;

        if !key.family.accepts(header.alg) {
            return Err(VerificationError::UnsupportedAlgorithm(header.alg));
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_seconds;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(audiences);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<serde_json::Value>(token, &key.key, &validation)?;

        for (claim, expected) in &self.claim_assertions {
            if data.claims.get(claim).and_then(serde_json::Value::as_str) != Some(expected.as_str()) {
                return Err(VerificationError::ClaimMismatch {
                    claim: claim.clone(),
                });
            }
        }

        let claims: VerifiedClaims = serde_json::from_value(data.claims)
            .map_err(|e| VerificationError::InvalidClaims(e.to_string()))?;

        debug!("Verified access token for subject {}", claims.sub);
        Ok(claims)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    pub const ISSUER: &str = "https://idp.example.com/oauth2/default";
    pub const AUDIENCE: &str = "api://default";
    pub const JWKS: &str = include_str!("../tests/fixtures/jwks.json");
    pub const SIGNING_KEY: &[u8] = include_bytes!("../tests/fixtures/signing_key.pem");
    pub const ROTATED_KEY: &[u8] = include_bytes!("../tests/fixtures/rotated_key.pem");

    pub fn sign_with(key_pem: &[u8], kid: &str, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &EncodingKey::from_rsa_pem(key_pem).unwrap()).unwrap()
    }

    pub fn sign(claims: &serde_json::Value) -> String {
        sign_with(SIGNING_KEY, "test-key-1", claims)
    }

    pub fn access_token_claims(sub: &str) -> serde_json::Value {
        let now = jsonwebtoken::get_current_timestamp();
        serde_json::json!({
            "sub": sub,
            "iss": ISSUER,
            "aud": AUDIENCE,
            "iat": now,
            "exp": now + 3600,
            "cid": "spa-client",
            "scp": ["openid", "profile"],
            "groups": ["admin", "users"]
        })
    }
}
