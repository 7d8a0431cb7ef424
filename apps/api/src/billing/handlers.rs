use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::{
    cancel_subscription, create_checkout, find_subscription, list_catalog, list_donations,
    portal_url, resume_subscription, total_donations, CatalogEntry, CheckoutKind,
};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{StripePayment, StripeSubscription};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BillingStatusResponse {
    pub available: bool,
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub price_id: String,
}

#[derive(Serialize)]
pub struct UrlResponse {
    pub url: String,
}

#[derive(Serialize)]
pub struct ActiveResponse {
    pub active: bool,
}

#[derive(Serialize)]
pub struct TotalResponse {
    /// Cents.
    pub total: i64,
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    #[serde(default)]
    pub immediately: bool,
}

/// GET /api/v1/billing/status
pub async fn handle_billing_status(State(state): State<AppState>) -> Json<BillingStatusResponse> {
    Json(BillingStatusResponse {
        available: state.stripe.is_configured(),
    })
}

/// GET /api/v1/billing/prices
///
/// Public; backs the pricing page.
pub async fn handle_list_prices(
    State(state): State<AppState>,
) -> Result<Json<Vec<CatalogEntry>>, AppError> {
    Ok(Json(list_catalog(&state.db).await?))
}

/// POST /api/v1/billing/checkout/subscription
pub async fn handle_subscription_checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<UrlResponse>, AppError> {
    let url = create_checkout(
        &state.db,
        &state.stripe,
        &state.config,
        &auth.user,
        CheckoutKind::Subscription,
        &req.price_id,
    )
    .await?;
    Ok(Json(UrlResponse { url }))
}

/// POST /api/v1/billing/checkout/donation
pub async fn handle_donation_checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<UrlResponse>, AppError> {
    let url = create_checkout(
        &state.db,
        &state.stripe,
        &state.config,
        &auth.user,
        CheckoutKind::Donation,
        &req.price_id,
    )
    .await?;
    Ok(Json(UrlResponse { url }))
}

/// POST /api/v1/billing/portal
pub async fn handle_open_portal(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UrlResponse>, AppError> {
    let url = portal_url(&state.db, &state.stripe, &state.config, &auth.user.id).await?;
    Ok(Json(UrlResponse { url }))
}

/// GET /api/v1/billing/subscription
pub async fn handle_get_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Option<StripeSubscription>>, AppError> {
    Ok(Json(find_subscription(&state.db, &auth.user.id).await?))
}

/// GET /api/v1/billing/subscription/active
pub async fn handle_has_active_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ActiveResponse>, AppError> {
    let active = find_subscription(&state.db, &auth.user.id)
        .await?
        .is_some_and(|s| s.status().grants_access());
    Ok(Json(ActiveResponse { active }))
}

/// POST /api/v1/billing/subscription/cancel
pub async fn handle_cancel_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
    req: Option<Json<CancelRequest>>,
) -> Result<StatusCode, AppError> {
    let immediately = req.map(|Json(r)| r.immediately).unwrap_or_default();
    cancel_subscription(&state.db, &state.stripe, &auth.user.id, immediately).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/billing/subscription/resume
pub async fn handle_resume_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    resume_subscription(&state.db, &state.stripe, &auth.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/billing/donations
pub async fn handle_list_donations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<StripePayment>>, AppError> {
    Ok(Json(list_donations(&state.db, &auth.user.id).await?))
}

/// GET /api/v1/billing/donations/total
pub async fn handle_total_donations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<TotalResponse>, AppError> {
    let total = total_donations(&state.db, &auth.user.id).await?;
    Ok(Json(TotalResponse { total }))
}
