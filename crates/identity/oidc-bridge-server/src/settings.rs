//! Configuration for the server binary
//!
//! Sources, later ones taking precedence:
//! - Default values
//! - Configuration file (`config.toml`, or the path given with `--config`)
//! - Environment variables with the `OIDC_BRIDGE` prefix, e.g.
//!   `OIDC_BRIDGE__IDENTITY__ISSUER` or `OIDC_BRIDGE__SERVER__PORT`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use oidc_bridge_server::{
    AuthMethod, ClaimGroups, ConfigurationError, GroupMapper, HostConfig, IdentityProviderConfig,
    StaticGroups, VerifierSettings,
};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host, port, API prefix and auth method
    pub server: HostConfig,

    /// Identity provider (issuer, audiences, JWKS)
    pub identity: IdentityProviderConfig,

    /// Token verification tunables
    pub verifier: VerifierSettings,

    /// How verified callers are mapped to groups
    pub groups: GroupSettings,

    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSource {
    #[default]
    Static,
    Claim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    pub source: GroupSource,

    /// Groups granted to every caller with `source = "static"`
    pub static_groups: Vec<String>,

    /// Token claim read with `source = "claim"`
    pub claim: String,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            source: GroupSource::Static,
            static_groups: Vec::new(),
            claim: "groups".to_string(),
        }
    }
}

impl GroupSettings {
    pub fn mapper(&self) -> Arc<dyn GroupMapper> {
        match self.source {
            GroupSource::Static => Arc::new(StaticGroups::new(self.static_groups.iter().cloned())),
            GroupSource::Claim => Arc::new(ClaimGroups::new(self.claim.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Fallback filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// The configuration file to read: `path` if given (it must exist),
    /// otherwise `config.toml` when present.
    pub fn config_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
        match path {
            Some(path) if path.exists() => Ok(Some(path.to_path_buf())),
            Some(path) => anyhow::bail!("Configuration file {} not found", path.display()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                Ok(default.exists().then_some(default))
            }
        }
    }

    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }

        builder = builder.add_source(
            Environment::with_prefix("OIDC_BRIDGE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("identity.audiences")
                .with_list_parse_key("identity.scopes")
                .with_list_parse_key("groups.static_groups"),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let settings: Settings = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.server.validate()?;

        if self.server.auth_method == AuthMethod::Custom {
            self.identity.validate_server()?;
        }

        if self.groups.source == GroupSource::Claim && self.groups.claim.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("groups.claim"));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("logging.level"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.base, "api");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.auth_method, AuthMethod::Custom);
        assert_eq!(settings.groups.source, GroupSource::Static);
        assert_eq!(settings.verifier.leeway_seconds, 60);

        // No issuer or audiences yet.
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [server]
            name = "reports-api"
            base = "reports"
            port = 8080

            [identity]
            issuer = "https://idp.example.com/oauth2/default"
            client_id = "spa-client"
            audiences = ["api://default"]
            jwks_uri = "https://idp.example.com/oauth2/default/v1/keys"

            [verifier]
            leeway_seconds = 30

            [verifier.claim_assertions]
            cid = "spa-client"

            [groups]
            source = "claim"
            claim = "groups"
            "#,
        );

        let resolved = Settings::config_file(Some(file.path())).unwrap();
        assert_eq!(resolved.as_deref(), Some(file.path()));

        let settings = Settings::load(resolved.as_deref()).unwrap();
        assert_eq!(settings.server.name, "reports-api");
        assert_eq!(settings.server.base_path().as_deref(), Some("/reports"));
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.identity.audiences, vec!["api://default"]);
        assert_eq!(settings.verifier.leeway_seconds, 30);
        assert_eq!(
            settings.verifier.claim_assertions.get("cid").map(String::as_str),
            Some("spa-client")
        );
        assert_eq!(settings.groups.source, GroupSource::Claim);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Settings::config_file(Some(Path::new("/nonexistent/oidc-bridge.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_public_api_needs_no_identity_settings() {
        let mut settings = Settings::default();
        settings.server.auth_method = AuthMethod::None;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_group_claim() {
        let mut settings = Settings::default();
        settings.server.auth_method = AuthMethod::None;
        settings.groups.source = GroupSource::Claim;
        settings.groups.claim = String::new();
        assert!(matches!(
            settings.validate(),
            Err(ConfigurationError::MissingSetting("groups.claim"))
        ));
    }
}
