//! Cached JSON Web Key Set of the identity provider.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::VerificationError;

/// Default minimum time between two refetches of the key set.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Key family of a JWK, deciding which `alg` values may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
}

impl KeyFamily {
    fn of(jwk: &Jwk) -> Option<Self> {
        match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => Some(KeyFamily::Rsa),
            AlgorithmParameters::EllipticCurve(params) => match params.curve {
                EllipticCurve::P256 => Some(KeyFamily::EcP256),
                EllipticCurve::P384 => Some(KeyFamily::EcP384),
                _ => None,
            },
            AlgorithmParameters::OctetKeyPair(_) => Some(KeyFamily::Ed25519),
            // Shared secrets are never accepted from a published key set.
            AlgorithmParameters::OctetKey(_) => None,
        }
    }

    pub fn accepts(&self, algorithm: Algorithm) -> bool {
        use Algorithm::*;
        match self {
            KeyFamily::Rsa => matches!(algorithm, RS256 | RS384 | RS512 | PS256 | PS384 | PS512),
            KeyFamily::EcP256 => algorithm == ES256,
            KeyFamily::EcP384 => algorithm == ES384,
            KeyFamily::Ed25519 => algorithm == EdDSA,
        }
    }
}

#[derive(Clone)]
pub struct SigningKey {
    pub kid: Option<String>,
    pub family: KeyFamily,
    pub key: DecodingKey,
}

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

#[derive(Default)]
struct CachedKeys {
    keys: Vec<SigningKey>,
}

impl CachedKeys {
    fn find(&self, kid: Option<&str>) -> Option<SigningKey> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|key| key.kid.as_deref() == Some(kid))
                .cloned(),
            // Without a kid the key is only unambiguous if there is exactly one.
            None => match self.keys.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            },
        }
    }
}

/// Signing keys fetched from a JWKS endpoint.
///
/// Keys are fetched lazily. A token whose `kid` is not cached triggers a
/// refetch, at most once per refresh interval whether or not the previous
/// attempt succeeded. Lookups of cached keys never wait for a refetch.
pub struct JwksCache {
    http_client: reqwest::Client,
    jwks_uri: String,
    refresh_interval: Duration,
    state: RwLock<CachedKeys>,
    /// Time of the last fetch attempt; held for the duration of a fetch.
    last_attempt: Mutex<Option<Instant>>,
}

impl JwksCache {
    pub fn new(http_client: reqwest::Client, jwks_uri: impl Into<String>) -> Self {
        Self {
            http_client,
            jwks_uri: jwks_uri.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            state: RwLock::new(CachedKeys::default()),
            last_attempt: Mutex::new(None),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// The key for `kid`, refetching the key set if it is not cached.
    pub async fn key(&self, kid: Option<&str>) -> Result<SigningKey, VerificationError> {
        if let Some(key) = self.state.read().await.find(kid) {
            return Ok(key);
        }

        let mut last_attempt = self.last_attempt.lock().await;
        // Another request may have refreshed while we waited for the gate.
        if let Some(key) = self.state.read().await.find(kid) {
            return Ok(key);
        }

        let previous = *last_attempt;
        let stale = previous.is_none_or(|at| at.elapsed() >= self.refresh_interval);
        if !stale {
            debug!("Skipping JWKS refetch for kid {:?}, attempted recently", kid);
            return Err(VerificationError::UnknownKey(kid.map(str::to_string)));
        }

        *last_attempt = Some(Instant::now());
        let keys = CachedKeys {
            keys: self.fetch().await?,
        };
        let key = keys.find(kid);
        *self.state.write().await = keys;

        key.ok_or_else(|| VerificationError::UnknownKey(kid.map(str::to_string)))
    }

    async fn fetch(&self) -> Result<Vec<SigningKey>, VerificationError> {
        debug!("Fetching JWKS from {}", self.jwks_uri);

        let response = self.http_client.get(&self.jwks_uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::JwksStatus {
                status: status.as_u16(),
            });
        }

        let raw: RawKeySet = response
            .json()
            .await
            .map_err(|e| VerificationError::InvalidJwks(e.to_string()))?;

        let keys: Vec<SigningKey> = raw.keys.into_iter().filter_map(parse_key).collect();
        info!("Loaded {} signing keys from {}", keys.len(), self.jwks_uri);
        Ok(keys)
    }
}

fn parse_key(value: serde_json::Value) -> Option<SigningKey> {
    let jwk: Jwk = match serde_json::from_value(value) {
        Ok(jwk) => jwk,
        Err(e) => {
            warn!("Skipping unreadable JWK: {}", e);
            return None;
        }
    };

    if matches!(
        jwk.common.public_key_use,
        Some(PublicKeyUse::Encryption | PublicKeyUse::Other(_))
    ) {
        debug!("Skipping non-signing JWK {:?}", jwk.common.key_id);
        return None;
    }

    let Some(family) = KeyFamily::of(&jwk) else {
        warn!("Skipping JWK {:?} with unsupported key type", jwk.common.key_id);
        return None;
    };

    match DecodingKey::from_jwk(&jwk) {
        Ok(key) => Some(SigningKey {
            kid: jwk.common.key_id.clone(),
            family,
            key,
        }),
        Err(e) => {
            warn!("Skipping JWK {:?}: {}", jwk.common.key_id, e);
            None
        }
    }
}
