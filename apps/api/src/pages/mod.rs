//! Server-rendered public pages.

pub mod templates;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::auth::handlers::sanitize_callback_url;
use crate::auth::MaybeAuthUser;
use crate::state::AppState;

/// GET /
pub async fn handle_home(State(state): State<AppState>) -> Html<String> {
    Html(templates::home_page(&state.config))
}

#[derive(Deserialize)]
pub struct LoginQuery {
    pub callback_url: Option<String>,
    pub error: Option<String>,
}

/// GET /login
///
/// Signed-in visitors go straight to the callback URL.
pub async fn handle_login(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Query(query): Query<LoginQuery>,
) -> Response {
    let callback_url = sanitize_callback_url(query.callback_url.as_deref());
    if user.is_some() {
        return Redirect::to(&callback_url).into_response();
    }
    Html(templates::login_page(
        &state.config,
        &callback_url,
        query.error.as_deref(),
    ))
    .into_response()
}

/// GET /terms
pub async fn handle_terms(State(state): State<AppState>) -> Html<String> {
    Html(templates::terms_page(&state.config))
}

/// GET /privacy
pub async fn handle_privacy(State(state): State<AppState>) -> Html<String> {
    Html(templates::privacy_page(&state.config))
}

pub async fn handle_not_found(State(state): State<AppState>) -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        Html(templates::not_found_page(&state.config)),
    )
}
