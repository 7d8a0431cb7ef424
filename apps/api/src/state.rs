use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::auth::oauth::GoogleOAuthClient;
use crate::config::Config;
use crate::stripe_client::StripeClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Only reported by the health check; no handler reads from it yet.
    pub secondary_db: Option<PgPool>,
    /// OAuth state and webhook de-duplication markers.
    pub redis: RedisClient,
    /// Unconfigured when `STRIPE_SECRET_KEY` is unset; billing routes answer 503.
    pub stripe: StripeClient,
    pub google: GoogleOAuthClient,
    pub config: Config,
}

#[cfg(test)]
impl AppState {
    /// State whose pool and Redis client connect lazily, for router tests
    /// that never reach the database.
    pub fn for_tests(config: Config) -> Self {
        let db = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .expect("valid database url");
        let redis = RedisClient::open(config.redis_url.as_str()).expect("valid redis url");
        let google = GoogleOAuthClient::new(
            &config.google_client_id,
            &config.google_client_secret,
            &config.app_url,
        );
        AppState {
            db,
            secondary_db: None,
            redis,
            stripe: StripeClient::new(config.stripe_secret_key.clone()),
            google,
            config,
        }
    }
}
