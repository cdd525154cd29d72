//! `oidc-bridge-server`: serves an API behind the bearer-token authenticator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use oidc_bridge_server::{
    AuthMethod, BearerAuthenticator, CustomAuthenticator, SharedAuthenticator, router, start,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod settings;

use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "oidc-bridge-server", version, about = "OIDC bearer-token protected API host")]
struct Cli {
    /// Path to the TOML configuration file (default: ./config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_file = Settings::config_file(cli.config.as_deref())?;
    let settings = Settings::load(config_file.as_deref())?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &config_file {
        Some(file) => info!("Loaded configuration from {}", file.display()),
        None => debug!("No config file found, using defaults and environment"),
    }

    settings.validate().context("Invalid configuration")?;

    let authenticator = match settings.server.auth_method {
        AuthMethod::Custom => {
            let mut authenticator = BearerAuthenticator::new(settings.identity.clone())
                .with_settings(settings.verifier.clone())
                .with_group_mapper(settings.groups.mapper());
            authenticator
                .initialize()
                .await
                .context("Failed to initialize the bearer authenticator")?;

            let authenticator: SharedAuthenticator = Arc::new(authenticator);
            Some(authenticator)
        }
        AuthMethod::None => {
            warn!("Authentication is disabled, the API is public");
            None
        }
    };

    let app = router(&settings.server, authenticator, api())?;
    info!("Starting {}", settings.server.name);
    start(&settings.server, app).await.context("Server error")?;

    Ok(())
}

fn api() -> Router {
    Router::new().route("/ping", get(ping))
}

async fn ping() -> &'static str {
    "pong"
}
