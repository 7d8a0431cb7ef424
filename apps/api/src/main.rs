mod auth;
mod billing;
mod config;
mod db;
mod errors;
mod models;
mod pages;
mod profile;
mod roles;
mod routes;
mod state;
mod stripe_client;
mod validation;
mod webhook;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::oauth::GoogleOAuthClient;
use crate::config::{Config, DatabaseConfig};
use crate::db::{create_pool, create_secondary_pool, run_migrations};
use crate::routes::build_router;
use crate::state::AppState;
use crate::stripe_client::StripeClient;

/// Launchpad API server
#[derive(Parser)]
#[command(name = "launchpad", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Default)]
enum Command {
    /// Run the HTTP server (default)
    #[default]
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Insert development seed data and exit
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_default() {
        Command::Serve => {
            // Load configuration first (fails on missing required env vars)
            let config = Config::from_env()?;
            init_tracing(&config.rust_log);
            serve(config).await
        }
        Command::Migrate => {
            let config = DatabaseConfig::from_env()?;
            init_tracing(&config.rust_log);
            let db = create_pool(&config.database_url, 1).await?;
            run_migrations(&db).await?;
            db.close().await;
            Ok(())
        }
        Command::Seed => {
            let config = DatabaseConfig::from_env()?;
            init_tracing(&config.rust_log);
            let db = create_pool(&config.database_url, 1).await?;
            db::seed::seed(&db).await?;
            db.close().await;
            Ok(())
        }
    }
}

/// Initialize structured logging. `RUST_LOG` directives win over the level.
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), level))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Launchpad API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.database_max_connections).await?;
    if config.run_migrations {
        run_migrations(&db).await?;
    }
    let secondary_db = create_secondary_pool(&config).await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let stripe = StripeClient::new(config.stripe_secret_key.clone());
    if stripe.is_configured() {
        info!("Stripe billing enabled");
    } else {
        info!("STRIPE_SECRET_KEY not set, billing routes are disabled");
    }

    let google = GoogleOAuthClient::new(
        &config.google_client_id,
        &config.google_client_secret,
        &config.app_url,
    );

    // Build app state
    let state = AppState {
        db: db.clone(),
        secondary_db: secondary_db.clone(),
        redis,
        stripe,
        google,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    if let Some(pool) = secondary_db {
        pool.close().await;
    }
    info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
