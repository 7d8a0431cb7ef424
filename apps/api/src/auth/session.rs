//! Persistence for the sign-in flow: pending OAuth state in Redis, and users,
//! linked accounts and sessions in Postgres.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::oauth::{random_token, GoogleUserInfo, TokenResponse, PROVIDER_ID};
use super::{OAUTH_STATE_TTL_SECS, SESSION_REFRESH_THRESHOLD_SECS, SESSION_TTL_SECS};
use crate::errors::AppError;
use crate::models::{Account, Session, User};

// ────────────────────────────────────────────────────────────────────────────
// OAuth state
// ────────────────────────────────────────────────────────────────────────────

/// What the callback needs to finish a sign-in started by this server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthState {
    pub code_verifier: String,
    pub callback_url: String,
}

fn oauth_state_key(state: &str) -> String {
    format!("oauth:state:{state}")
}

pub async fn store_oauth_state(
    redis: &redis::Client,
    state: &str,
    pending: &OAuthState,
) -> Result<(), AppError> {
    let value = serde_json::to_string(pending).map_err(anyhow::Error::from)?;
    let mut conn = redis.get_multiplexed_async_connection().await?;
    redis::cmd("SET")
        .arg(oauth_state_key(state))
        .arg(value)
        .arg("EX")
        .arg(OAUTH_STATE_TTL_SECS)
        .query_async::<_, ()>(&mut conn)
        .await?;
    Ok(())
}

/// Reads and deletes the pending state, so each state value is usable once.
pub async fn take_oauth_state(
    redis: &redis::Client,
    state: &str,
) -> Result<Option<OAuthState>, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let raw: Option<String> = redis::cmd("GETDEL")
        .arg(oauth_state_key(state))
        .query_async(&mut conn)
        .await?;
    Ok(raw.and_then(|v| serde_json::from_str(&v).ok()))
}

// ────────────────────────────────────────────────────────────────────────────
// Users and accounts
// ────────────────────────────────────────────────────────────────────────────

fn display_name(info: &GoogleUserInfo, email: &str) -> String {
    info.name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

/// Finds or creates the user for a Google identity, matching on email.
pub async fn upsert_oauth_user(pool: &PgPool, info: &GoogleUserInfo) -> Result<User, AppError> {
    let email = info
        .email
        .as_deref()
        .ok_or(super::oauth::OAuthError::MissingEmail)?
        .to_lowercase();

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, name, email, email_verified, image)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET
            name = EXCLUDED.name,
            email_verified = users.email_verified OR EXCLUDED.email_verified,
            image = COALESCE(EXCLUDED.image, users.image),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(display_name(info, &email))
    .bind(&email)
    .bind(info.email_verified)
    .bind(&info.picture)
    .fetch_one(pool)
    .await?;

    debug!("Upserted user {} for Google account {}", user.id, info.sub);
    Ok(user)
}

/// Links (or refreshes the tokens of) the Google account for a user.
pub async fn upsert_account(
    pool: &PgPool,
    user_id: &str,
    info: &GoogleUserInfo,
    tokens: &TokenResponse,
) -> Result<Account, AppError> {
    let expires_at = tokens
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs));

    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts
            (id, account_id, provider_id, user_id, access_token, refresh_token,
             id_token, access_token_expires_at, scope)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (provider_id, account_id) DO UPDATE SET
            access_token = EXCLUDED.access_token,
            refresh_token = COALESCE(EXCLUDED.refresh_token, accounts.refresh_token),
            id_token = EXCLUDED.id_token,
            access_token_expires_at = EXCLUDED.access_token_expires_at,
            scope = EXCLUDED.scope,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&info.sub)
    .bind(PROVIDER_ID)
    .bind(user_id)
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(&tokens.id_token)
    .bind(expires_at)
    .bind(&tokens.scope)
    .fetch_one(pool)
    .await?;

    Ok(account)
}

// ────────────────────────────────────────────────────────────────────────────
// Sessions
// ────────────────────────────────────────────────────────────────────────────

pub fn session_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(SESSION_TTL_SECS)
}

/// True when a live session is close enough to expiry to be extended.
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at > now && expires_at - now < Duration::seconds(SESSION_REFRESH_THRESHOLD_SECS)
}

pub async fn create_session(
    pool: &PgPool,
    user_id: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Session, AppError> {
    let session = sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (id, token, user_id, expires_at, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(random_token(32))
    .bind(user_id)
    .bind(session_expiry(Utc::now()))
    .bind(ip_address)
    .bind(user_agent)
    .fetch_one(pool)
    .await?;

    info!("Created session for user {}", user_id);
    Ok(session)
}

/// A live session and its user.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub user: User,
    pub session: Session,
    /// Set when this lookup extended the expiry; the cookie should be re-issued.
    pub refreshed: bool,
}

/// Resolves a session token. Expired sessions resolve to `None`.
pub async fn find_active_session(
    pool: &PgPool,
    token: &str,
) -> Result<Option<ActiveSession>, AppError> {
    let session: Option<Session> =
        sqlx::query_as("SELECT * FROM sessions WHERE token = $1 AND expires_at > NOW()")
            .bind(token)
            .fetch_optional(pool)
            .await?;

    let Some(mut session) = session else {
        return Ok(None);
    };

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?;

    let Some(user) = user else {
        return Ok(None);
    };

    let now = Utc::now();
    let refreshed = needs_refresh(session.expires_at, now);
    if refreshed {
        session = sqlx::query_as::<_, Session>(
            "UPDATE sessions SET expires_at = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(session_expiry(now))
        .bind(&session.id)
        .fetch_one(pool)
        .await?;
        debug!("Extended session {} to {}", session.id, session.expires_at);
    }

    Ok(Some(ActiveSession {
        user,
        session,
        refreshed,
    }))
}

pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_window() {
        let now = Utc::now();
        assert!(!needs_refresh(now + Duration::days(6), now));
        assert!(!needs_refresh(now + Duration::hours(25), now));
        assert!(needs_refresh(now + Duration::hours(23), now));
        assert!(!needs_refresh(now - Duration::minutes(1), now), "expired sessions stay expired");
    }

    #[test]
    fn test_session_expiry_is_seven_days() {
        let now = Utc::now();
        assert_eq!(session_expiry(now) - now, Duration::days(7));
    }

    #[test]
    fn test_display_name_falls_back_to_email_local_part() {
        let info = GoogleUserInfo {
            sub: "1".into(),
            email: Some("jane@example.com".into()),
            email_verified: true,
            name: Some("  ".into()),
            picture: None,
        };
        assert_eq!(display_name(&info, "jane@example.com"), "jane");

        let named = GoogleUserInfo {
            name: Some("Jane Doe".into()),
            ..info
        };
        assert_eq!(display_name(&named, "jane@example.com"), "Jane Doe");
    }

    async fn user_with_session(pool: &PgPool, expires_in: Duration) -> Session {
        sqlx::query("INSERT INTO users (id, name, email) VALUES ('u_s', 'S', 's@launchpad.test')")
            .execute(pool)
            .await
            .unwrap();
        let session = create_session(pool, "u_s", Some("127.0.0.1"), None)
            .await
            .unwrap();
        sqlx::query("UPDATE sessions SET expires_at = $1 WHERE id = $2")
            .bind(Utc::now() + expires_in)
            .bind(&session.id)
            .execute(pool)
            .await
            .unwrap();
        session
    }

    #[sqlx::test]
    #[ignore]
    async fn test_session_near_expiry_slides_forward(pool: PgPool) {
        let session = user_with_session(&pool, Duration::hours(2)).await;

        let active = find_active_session(&pool, &session.token)
            .await
            .unwrap()
            .unwrap();
        assert!(active.refreshed);
        assert_eq!(active.user.id, "u_s");
        assert!(active.session.expires_at - Utc::now() > Duration::days(6));

        let again = find_active_session(&pool, &session.token)
            .await
            .unwrap()
            .unwrap();
        assert!(!again.refreshed);
    }

    #[sqlx::test]
    #[ignore]
    async fn test_fresh_session_is_not_extended(pool: PgPool) {
        let session = user_with_session(&pool, Duration::days(3)).await;
        let active = find_active_session(&pool, &session.token)
            .await
            .unwrap()
            .unwrap();
        assert!(!active.refreshed);
        assert!(active.session.expires_at - Utc::now() < Duration::days(4));
    }

    #[sqlx::test]
    #[ignore]
    async fn test_expired_or_deleted_session_resolves_to_none(pool: PgPool) {
        let session = user_with_session(&pool, Duration::minutes(-5)).await;
        assert!(find_active_session(&pool, &session.token)
            .await
            .unwrap()
            .is_none());

        let live = create_session(&pool, "u_s", None, None).await.unwrap();
        delete_session(&pool, &live.token).await.unwrap();
        assert!(find_active_session(&pool, &live.token)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_oauth_state_serializes() {
        let pending = OAuthState {
            code_verifier: "v".into(),
            callback_url: "/account".into(),
        };
        let raw = serde_json::to_string(&pending).unwrap();
        assert_eq!(serde_json::from_str::<OAuthState>(&raw).unwrap(), pending);
        assert_eq!(oauth_state_key("abc"), "oauth:state:abc");
    }
}
