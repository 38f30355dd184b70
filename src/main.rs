use anyhow::{Context, Result};
use clap::Parser;
use sqlroutes::config::{AppConfig, DEFAULT_CONFIG_PATH};
use sqlroutes::db::{create_pool, PgBackend};
use sqlroutes::engine::RouteTable;
use sqlroutes::server::{self, ApiKeySet, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve read-only PostgreSQL queries as HTTP endpoints
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SQLROUTES_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Validate the configuration and routes, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    config.resolve_secrets(|name| std::env::var(name).ok());
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let table = RouteTable::new(config.routes.clone())
        .with_context(|| format!("invalid routes in {}", cli.config.display()))?;
    info!(routes = table.len(), config = %cli.config.display(), "configuration loaded");

    if cli.check {
        println!("{}: {} routes OK", cli.config.display(), table.len());
        return Ok(());
    }

    info!(database = %config.database.display_string(), "connecting to database");
    let pool = create_pool(&config.database)?;
    let backend = Arc::new(PgBackend::new(pool));
    let api_keys = ApiKeySet::new(config.auth.api_keys.iter().cloned());

    let state = AppState::new(table, backend, api_keys);
    server::serve(state, &config.server).await
}
