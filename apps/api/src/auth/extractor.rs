use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use tracing::warn;

use super::cookie::{read_cookie, verify_signed, SESSION_COOKIE};
use super::session::{find_active_session, ActiveSession};
use crate::errors::AppError;
use crate::models::{Session, User};
use crate::state::AppState;

/// Signed-in user. Rejects with 401 when the request has no live session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session: Session,
}

/// Returns the verified session token carried by the request, if any.
pub fn session_token(headers: &HeaderMap, secret: &str) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE).and_then(|v| verify_signed(&v, secret))
}

pub async fn resolve_session(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Option<ActiveSession>, AppError> {
    match session_token(headers, &state.config.auth_secret) {
        Some(token) => find_active_session(&state.db, &token).await,
        None => Ok(None),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let active = resolve_session(&parts.headers, state)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(AuthUser {
            user: active.user,
            session: active.session,
        })
    }
}

/// Optional variant of [`AuthUser`]; lookup failures are logged and treated
/// as signed out.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user))),
            Err(AppError::Unauthorized) => Ok(MaybeAuthUser(None)),
            Err(e) => {
                warn!("Session lookup failed: {e}");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}
