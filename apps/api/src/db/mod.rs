pub mod seed;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};

use crate::config::Config;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(20))
        .connect(database_url)
        .await
        .context("Failed to connect to the primary database")?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Connects the secondary database when `DATABASE_SECONDARY_URL` is set.
pub async fn create_secondary_pool(config: &Config) -> Result<Option<PgPool>> {
    let Some(url) = config.database_secondary_url.as_deref() else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(20))
        .connect(url)
        .await
        .context("Failed to connect to the secondary database")?;

    info!("Secondary PostgreSQL pool established");
    Ok(Some(pool))
}

/// Returns whether the database answers `SELECT 1`.
pub async fn check_connection(pool: &PgPool) -> bool {
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
        Ok(_) => true,
        Err(e) => {
            error!("Database connection check failed: {}", e);
            false
        }
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Migrations complete");
    Ok(())
}
