//! Token endpoint responses and the persisted session tokens.

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

/// Tokens held for the current browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: response
                .expires_in
                .map(|seconds| now + Duration::seconds(seconds as i64)),
            access_token: response.access_token,
            token_type: response.token_type,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            scope: response.scope,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Claims of the ID token, or of the access token when it is a JWT and no
    /// ID token was issued.
    pub fn claims(&self) -> Option<serde_json::Value> {
        self.id_token
            .as_deref()
            .and_then(|token| decode_claims(token).ok())
            .or_else(|| decode_claims(&self.access_token).ok())
    }
}

/// Decodes the payload of a compact JWT without verifying it.
///
/// The browser only uses these claims for display; the API server verifies
/// every token it receives.
pub fn decode_claims(token: &str) -> ClientResult<serde_json::Value> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(ClientError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClientError::MalformedToken(e.to_string()))?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes)?;
    if !claims.is_object() {
        return Err(ClientError::MalformedToken(
            "payload is not a JSON object".to_string(),
        ));
    }

    Ok(claims)
}

/// OAuth2 user info response (OpenID Connect compatible)
///
/// Accepts both `sub` (OpenID Connect) and `id` (legacy OAuth2 userinfo
/// endpoints) for the user identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoResponse {
    #[serde(alias = "id")]
    pub sub: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    #[serde(flatten)]
    pub additional_claims: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
pub(crate) fn encode_unsigned_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
