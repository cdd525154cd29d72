//! Host bootstrap: mounts an application API behind the authenticator and serves it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Json;
use axum::Router;
use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use oidc_bridge_core::ConfigurationError;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::identity::VerifiedIdentity;
use crate::middleware::{SharedAuthenticator, require_identity};

/// How requests to the application API are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No authentication; the API is public
    None,
    /// Every request goes through the configured [`CustomAuthenticator`](crate::CustomAuthenticator)
    #[default]
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Whether to allow any origin
    #[serde(default = "default_true")]
    pub allow_any_origin: bool,

    /// Allowed origins when `allow_any_origin` is false
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_any_origin: true,
            allowed_origins: vec![],
        }
    }
}

/// Where and how the application API is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Service name, used in logs
    pub name: String,

    /// Path prefix of the API, without slashes (`api` serves `/api/...`)
    pub base: String,

    pub host: IpAddr,

    pub port: u16,

    pub auth_method: AuthMethod,

    pub cors: CorsConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "oidc-bridge-server".to_string(),
            base: "api".to_string(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            auth_method: AuthMethod::Custom,
            cors: CorsConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl HostConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The API prefix as a route path, `None` when the API sits at the root.
    pub fn base_path(&self) -> Option<String> {
        let base = self.base.trim_matches('/');
        (!base.is_empty()).then(|| format!("/{base}"))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("server.name"));
        }

        if self.port == 0 {
            return Err(ConfigurationError::Invalid(
                "server port cannot be 0".to_string(),
            ));
        }

        if !self.cors.allow_any_origin {
            for origin in &self.cors.allowed_origins {
                HeaderValue::from_str(origin).map_err(|_| {
                    ConfigurationError::Invalid(format!("invalid CORS origin {origin:?}"))
                })?;
            }
        }

        Ok(())
    }

    pub fn cors_layer(&self) -> CorsLayer {
        if self.cors.allow_any_origin {
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = self
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn whoami(identity: VerifiedIdentity) -> Json<VerifiedIdentity> {
    Json(identity)
}

/// Mounts `api` under `/{base}`.
///
/// With [`AuthMethod::Custom`] every API route runs behind `authenticator`,
/// and a built-in `GET /{base}/whoami` returns the caller's identity; it is a
/// configuration error to omit the authenticator.
pub fn router(
    config: &HostConfig,
    authenticator: Option<SharedAuthenticator>,
    api: Router,
) -> Result<Router, ConfigurationError> {
    let api = match (config.auth_method, authenticator) {
        (AuthMethod::Custom, Some(authenticator)) => api
            .route("/whoami", get(whoami))
            .route_layer(from_fn_with_state(authenticator, require_identity)),
        (AuthMethod::Custom, None) => {
            return Err(ConfigurationError::MissingSetting("authenticator"));
        }
        (AuthMethod::None, _) => api,
    };

    let app = match config.base_path() {
        Some(base) => Router::new().nest(&base, api),
        None => api,
    };

    Ok(app.layer(TraceLayer::new_for_http()))
}

/// Serves `app` on the configured address until Ctrl-C.
pub async fn start(config: &HostConfig, app: Router) -> std::io::Result<()> {
    let app = app.layer(config.cors_layer());

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    info!(
        "{} listening on http://{}{}",
        config.name,
        listener.local_addr()?,
        config.base_path().unwrap_or_default()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
