//! Verified claims, the identity built from them, and group mapping.

use std::collections::BTreeSet;

use async_trait::async_trait;
use oidc_bridge_core::{AuthError, AuthResult};
use serde::{Deserialize, Deserializer, Serialize};

/// Claims of an access token that passed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    pub sub: String,
    pub iss: String,
    #[serde(deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    /// Client the token was issued to (Okta)
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub scp: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// The internal identity attached to an authenticated request.
///
/// Only the authenticator creates these, and only from verified claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    id: String,
    groups: BTreeSet<String>,
    apps: Vec<String>,
}

impl VerifiedIdentity {
    pub(crate) fn from_claims(claims: &VerifiedClaims, groups: BTreeSet<String>) -> Self {
        Self {
            id: claims.sub.clone(),
            groups,
            apps: Vec::new(),
        }
    }

    /// The token subject.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn apps(&self) -> &[String] {
        &self.apps
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Succeeds if the identity is in every group of `required`.
    pub fn check_groups(&self, required: &[String]) -> AuthResult<()> {
        if required.iter().all(|group| self.groups.contains(group)) {
            return Ok(());
        }

        Err(AuthError::InsufficientGroups {
            required: required.to_vec(),
            has: self.groups.iter().cloned().collect(),
        })
    }
}

/// Maps verified claims to the groups of an identity.
#[async_trait]
pub trait GroupMapper: Send + Sync {
    async fn groups_for(&self, claims: &VerifiedClaims) -> BTreeSet<String>;
}

/// The same groups for every verified caller.
#[derive(Debug, Clone, Default)]
pub struct StaticGroups {
    groups: BTreeSet<String>,
}

impl StaticGroups {
    pub fn new<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl GroupMapper for StaticGroups {
    async fn groups_for(&self, _claims: &VerifiedClaims) -> BTreeSet<String> {
        self.groups.clone()
    }
}

/// Groups read from a token claim holding a string or an array of strings.
#[derive(Debug, Clone)]
pub struct ClaimGroups {
    claim: String,
}

impl ClaimGroups {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
        }
    }
}

#[async_trait]
impl GroupMapper for ClaimGroups {
    async fn groups_for(&self, claims: &VerifiedClaims) -> BTreeSet<String> {
        match claims.extra.get(&self.claim) {
            Some(serde_json::Value::String(group)) => BTreeSet::from([group.clone()]),
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(|value| value.as_str().map(str::to_string))
                .collect(),
            _ => BTreeSet::new(),
        }
    }
}

#[cfg(test)]
pub(crate) fn claims_for(sub: &str, extra: serde_json::Value) -> VerifiedClaims {
    let mut value = serde_json::json!({
        "sub": sub,
        "iss": "https://idp.example.com/oauth2/default",
        "aud": "api://default",
        "exp": 4_102_444_800i64
    });
    if let (Some(target), serde_json::Value::Object(extra)) = (value.as_object_mut(), extra) {
        target.extend(extra);
    }
    serde_json::from_value(value).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_audience_one_or_many() {
        let single = claims_for("00u1", serde_json::json!({}));
        assert_eq!(single.aud, vec!["api://default"]);
        assert!(single.scp.is_empty());

        let many = claims_for(
            "00u1",
            serde_json::json!({"aud": ["a", "b"], "scp": ["openid", "email"], "cid": "spa"}),
        );
        assert_eq!(many.aud, vec!["a", "b"]);
        assert_eq!(many.scp, vec!["openid", "email"]);
        assert_eq!(many.cid.as_deref(), Some("spa"));
        assert!(!many.extra.contains_key("cid"));
    }

    #[test]
    fn test_check_groups() {
        let claims = claims_for("00u1", serde_json::json!({}));
        let identity = VerifiedIdentity::from_claims(
            &claims,
            BTreeSet::from(["admin".to_string(), "users".to_string()]),
        );

        assert_eq!(identity.id(), "00u1");
        assert!(identity.apps().is_empty());
        assert!(identity.check_groups(&[]).is_ok());
        assert!(identity.check_groups(&["admin".to_string()]).is_ok());

        let err = identity
            .check_groups(&["admin".to_string(), "ops".to_string()])
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::InsufficientGroups {
                required: vec!["admin".to_string(), "ops".to_string()],
                has: vec!["admin".to_string(), "users".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_static_groups() {
        let mapper = StaticGroups::new(["users"]);
        let groups = mapper
            .groups_for(&claims_for("00u1", serde_json::json!({})))
            .await;
        assert_eq!(groups, BTreeSet::from(["users".to_string()]));
    }

    #[tokio::test]
    async fn test_claim_groups() {
        let mapper = ClaimGroups::new("groups");

        let claims = claims_for("00u1", serde_json::json!({"groups": ["admin", 7, "ops"]}));
        assert_eq!(
            mapper.groups_for(&claims).await,
            BTreeSet::from(["admin".to_string(), "ops".to_string()])
        );

        let claims = claims_for("00u1", serde_json::json!({"groups": "admin"}));
        assert_eq!(
            mapper.groups_for(&claims).await,
            BTreeSet::from(["admin".to_string()])
        );

        let claims = claims_for("00u1", serde_json::json!({}));
        assert!(mapper.groups_for(&claims).await.is_empty());
    }
}
