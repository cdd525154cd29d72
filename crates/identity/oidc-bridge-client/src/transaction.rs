//! Pending sign-in transactions carried across the provider round trip.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, thread_rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::browser::SessionStore;
use crate::error::{ClientError, ClientResult};

const TRANSACTION_PREFIX: &str = "oidc-bridge.transaction.";

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_verifier() -> String {
        let mut rng = thread_rng();
        let bytes: Vec<u8> = (0..64).map(|_| rng.r#gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// Everything the callback needs to finish a sign-in started on this tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectTransaction {
    pub state: String,
    pub nonce: String,
    pub code_verifier: Option<String>,
    /// Path to restore once the callback completes
    pub original_uri: Option<String>,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RedirectTransaction {
    pub fn new(
        redirect_uri: String,
        code_verifier: Option<String>,
        original_uri: Option<String>,
        ttl_seconds: u64,
    ) -> Self {
        let created_at = Utc::now();
        let expires_at = created_at + Duration::seconds(ttl_seconds as i64);

        Self {
            state: Uuid::new_v4().to_string(),
            nonce: Uuid::new_v4().to_string(),
            code_verifier,
            original_uri,
            redirect_uri,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Persists [`RedirectTransaction`]s in session storage, keyed by `state`.
#[derive(Clone)]
pub struct TransactionStore {
    session: Arc<dyn SessionStore>,
}

impl TransactionStore {
    pub fn new(session: Arc<dyn SessionStore>) -> Self {
        Self { session }
    }

    fn key(state: &str) -> String {
        format!("{TRANSACTION_PREFIX}{state}")
    }

    pub fn store(&self, transaction: &RedirectTransaction) -> ClientResult<()> {
        let value = serde_json::to_string(transaction)?;
        self.session.set(&Self::key(&transaction.state), &value)
    }

    /// Retrieves and removes the transaction for `state`. Expired transactions
    /// are reported as not found.
    pub fn take(&self, state: &str) -> ClientResult<RedirectTransaction> {
        let key = Self::key(state);
        let value = self.session.get(&key)?.ok_or(ClientError::StateNotFound)?;
        self.session.remove(&key)?;

        let transaction: RedirectTransaction = serde_json::from_str(&value)?;
        if transaction.is_expired() {
            return Err(ClientError::StateNotFound);
        }

        Ok(transaction)
    }

    /// Drops expired or unreadable transactions. Returns how many were removed.
    pub fn cleanup_expired(&self) -> ClientResult<usize> {
        let mut removed = 0;

        for key in self.session.keys()? {
            if !key.starts_with(TRANSACTION_PREFIX) {
                continue;
            }

            let stale = match self.session.get(&key)? {
                Some(value) => serde_json::from_str::<RedirectTransaction>(&value)
                    .map(|transaction| transaction.is_expired())
                    .unwrap_or(true),
                None => false,
            };

            if stale {
                self.session.remove(&key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Removed {} stale sign-in transactions", removed);
        }

        Ok(removed)
    }
}
