use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::cookie::{expired_session_cookie, session_cookie};
use super::extractor::{resolve_session, session_token};
use super::oauth::{generate_code_verifier, generate_state};
use super::session::{
    create_session, delete_session, store_oauth_state, take_oauth_state, upsert_account,
    upsert_oauth_user, OAuthState,
};
use crate::errors::AppError;
use crate::models::{Session, User};
use crate::roles::ensure_user_profile;
use crate::state::AppState;

/// Only same-origin relative paths are honored as post-login destinations.
pub fn sanitize_callback_url(raw: Option<&str>) -> String {
    match raw {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\") => {
            url.to_string()
        }
        _ => "/".to_string(),
    }
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Deserialize)]
pub struct SignInQuery {
    pub callback_url: Option<String>,
}

/// GET /api/auth/sign-in/google
pub async fn handle_sign_in_google(
    State(state): State<AppState>,
    Query(query): Query<SignInQuery>,
) -> Result<Redirect, AppError> {
    let oauth_state = generate_state();
    let code_verifier = generate_code_verifier();
    let url = state.google.authorization_url(&oauth_state, &code_verifier)?;

    store_oauth_state(
        &state.redis,
        &oauth_state,
        &OAuthState {
            code_verifier,
            callback_url: sanitize_callback_url(query.callback_url.as_deref()),
        },
    )
    .await?;

    Ok(Redirect::to(url.as_str()))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /api/auth/callback/google
pub async fn handle_google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(error) = query.error {
        warn!("Google sign-in returned error: {}", error);
        let encoded: String = url::form_urlencoded::byte_serialize(error.as_bytes()).collect();
        return Ok(Redirect::to(&format!("/login?error={encoded}")).into_response());
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(AppError::BadRequest("Missing code or state".to_string()));
    };

    let pending = take_oauth_state(&state.redis, &oauth_state)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired OAuth state".to_string()))?;

    let tokens = state
        .google
        .exchange_code(&code, &pending.code_verifier)
        .await?;
    let info = state.google.fetch_user_info(&tokens.access_token).await?;

    let user = upsert_oauth_user(&state.db, &info).await?;
    let account = upsert_account(&state.db, &user.id, &info, &tokens).await?;
    ensure_user_profile(&state.db, &user.id).await?;

    let session = create_session(
        &state.db,
        &user.id,
        client_ip(&headers).as_deref(),
        user_agent(&headers).as_deref(),
    )
    .await?;

    info!(
        "User {} signed in with {} account {}",
        user.id, account.provider_id, account.account_id
    );

    let cookie = session_cookie(
        &session.token,
        &state.config.auth_secret,
        state.config.secure_cookies(),
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&pending.callback_url),
    )
        .into_response())
}

/// POST /api/auth/sign-out
pub async fn handle_sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(token) = session_token(&headers, &state.config.auth_secret) {
        delete_session(&state.db, &token).await?;
    }
    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            expired_session_cookie(state.config.secure_cookies()),
        )],
    )
        .into_response())
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub session: Session,
}

/// GET /api/auth/session
///
/// `null` when signed out. Re-issues the cookie when the session was extended.
pub async fn handle_get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(active) = resolve_session(&headers, &state).await? else {
        return Ok(Json(None::<SessionResponse>).into_response());
    };

    let refreshed_cookie = active.refreshed.then(|| {
        session_cookie(
            &active.session.token,
            &state.config.auth_secret,
            state.config.secure_cookies(),
        )
    });
    let body = Json(Some(SessionResponse {
        user: active.user,
        session: active.session,
    }));

    match refreshed_cookie {
        Some(cookie) => Ok(([(header::SET_COOKIE, cookie)], body).into_response()),
        None => Ok(body.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_callback_url_must_be_relative() {
        assert_eq!(sanitize_callback_url(Some("/account")), "/account");
        assert_eq!(sanitize_callback_url(Some("/pricing?plan=pro")), "/pricing?plan=pro");
        assert_eq!(sanitize_callback_url(Some("//evil.com")), "/");
        assert_eq!(sanitize_callback_url(Some("/\\evil.com")), "/");
        assert_eq!(sanitize_callback_url(Some("https://evil.com")), "/");
        assert_eq!(sanitize_callback_url(None), "/");
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
