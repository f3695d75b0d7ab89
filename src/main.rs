//! MediaVault server
//!
//! Runs the access-token API and the periodic expiry sweep against a shared
//! database and media-repository connection.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediavault_access::{
    AbilityResolver, CollectionDirectory, IpGroupResolver, MemoryRepository, ResourceStore,
    RestRepository, TokenService,
};
use mediavault_api::AppState;

/// MediaVault - scoped access tokens for a digital media repository
#[derive(Parser, Debug)]
#[command(name = "mediavault")]
#[command(about = "MediaVault - scoped access tokens for a digital media repository")]
#[command(version)]
struct Cli {
    /// Address to bind the API server
    #[arg(long, env = "MEDIAVAULT_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Database connection URL (SQLite or Postgres)
    #[arg(
        long,
        env = "MEDIAVAULT_DATABASE_URL",
        default_value = "sqlite://mediavault.db?mode=rwc"
    )]
    database_url: String,

    /// Secret used to sign session tokens
    #[arg(long, env = "MEDIAVAULT_JWT_SECRET")]
    jwt_secret: String,

    /// Base URL of the media repository management API. Omitted: an
    /// in-memory repository is used, for development only
    #[arg(long, env = "MEDIAVAULT_REPOSITORY_URL")]
    repository_url: Option<String>,

    /// Public base URL used in patron-facing access links
    #[arg(
        long,
        env = "MEDIAVAULT_PUBLIC_URL",
        default_value = "http://localhost:8080"
    )]
    public_url: String,

    /// Seconds between expiry sweeps
    #[arg(long, env = "MEDIAVAULT_SWEEP_INTERVAL", default_value = "300")]
    sweep_interval_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Run the expiry sweep on a fixed interval for as long as the server lives.
fn spawn_sweep_loop(tokens: TokenService, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match tokens.sweep_expired().await {
                Ok(report) if report.processed > 0 || report.failed > 0 => {
                    info!(
                        processed = report.processed,
                        failed = report.failed,
                        "Access token sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Access token sweep failed: {e}"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let db = mediavault_db::connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    mediavault_db::migrate(&db)
        .await
        .context("Failed to run migrations")?;

    let (resources, collections, ip_groups): (
        Arc<dyn ResourceStore>,
        Arc<dyn CollectionDirectory>,
        Arc<dyn IpGroupResolver>,
    ) = match &cli.repository_url {
        Some(url) => {
            let repo = RestRepository::new(url).context("Failed to build repository client")?;
            info!("Using media repository at {}", url);
            (
                Arc::new(repo.clone()),
                Arc::new(repo.clone()),
                Arc::new(repo),
            )
        }
        None => {
            warn!("No repository URL configured; using the in-memory repository (development only)");
            let repo = MemoryRepository::new();
            (
                Arc::new(repo.clone()),
                Arc::new(repo.clone()),
                Arc::new(repo),
            )
        }
    };

    let tokens = TokenService::new(db.clone(), resources.clone(), collections.clone());
    let resolver = AbilityResolver::new(tokens.clone(), resources, collections, ip_groups);

    spawn_sweep_loop(tokens.clone(), cli.sweep_interval_secs);
    info!(
        "Expiry sweep scheduled every {} seconds",
        cli.sweep_interval_secs
    );

    let state = Arc::new(AppState {
        db,
        tokens,
        resolver,
        jwt_secret: cli.jwt_secret.into_bytes(),
        public_url: cli.public_url.trim_end_matches('/').to_string(),
    });

    mediavault_api::serve(cli.bind, state).await
}
