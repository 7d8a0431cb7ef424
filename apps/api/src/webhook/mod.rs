//! Stripe webhook endpoint: verifies, de-duplicates, then reconciles.

pub mod events;
pub mod idempotency;
pub mod reconcile;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use stripe::{Webhook, WebhookError};
use tracing::{error, info};

use crate::errors::AppError;
use crate::state::AppState;
use events::WebhookEvent;
use idempotency::{claim_event, release_event};

/// POST /api/stripe/webhook
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    if !state.stripe.is_configured() {
        return Err(AppError::BillingUnavailable);
    }

    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return Err(AppError::BadRequest(
            "Missing stripe-signature header".to_string(),
        ));
    };

    let invalid_signature = || AppError::BadRequest("Invalid signature".to_string());
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(invalid_signature)?;
    let payload = std::str::from_utf8(&body).map_err(|_| invalid_signature())?;

    let event = match Webhook::construct_event(payload, signature, secret) {
        Ok(event) => event,
        Err(WebhookError::BadParse(e)) => {
            error!("Webhook payload could not be parsed: {}", e);
            return Err(AppError::BadRequest(format!("Invalid event payload: {e}")));
        }
        Err(e) => {
            error!("Webhook signature verification failed: {}", e);
            return Err(invalid_signature());
        }
    };

    let event_id = event.id.to_string();
    process_event(&state, &event_id, WebhookEvent::from_stripe(event)).await?;
    Ok(Json(json!({ "received": true })))
}

/// Applies a verified event at most once per id. Returns `false` when the
/// event was a duplicate and nothing was applied.
///
/// On failure the claim is released so the provider's retry is processed.
pub async fn process_event(
    state: &AppState,
    event_id: &str,
    event: WebhookEvent,
) -> Result<bool, AppError> {
    if !claim_event(&state.redis, event_id).await {
        info!("Skipping duplicate webhook event {}", event_id);
        return Ok(false);
    }

    if let Err(e) = reconcile::apply_event(&state.db, &state.stripe, event).await {
        error!("Error processing webhook event {}: {}", event_id, e);
        release_event(&state.redis, event_id).await;
        return Err(AppError::WebhookFailed);
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::SubscriptionStatus;
    use sqlx::PgPool;

    fn settled(status: SubscriptionStatus) -> WebhookEvent {
        WebhookEvent::InvoiceSettled {
            invoice_id: "in_1".into(),
            subscription_id: Some("sub_dup".into()),
            status,
        }
    }

    async fn status(pool: &PgPool) -> String {
        sqlx::query_scalar(
            "SELECT status FROM stripe_subscription WHERE stripe_subscription_id = 'sub_dup'",
        )
        .fetch_one(pool)
        .await
        .unwrap()
    }

    /// Needs Postgres and a Redis at `redis://127.0.0.1:6379`.
    #[sqlx::test]
    #[ignore]
    async fn test_redelivered_event_is_acknowledged_without_effect(pool: PgPool) {
        sqlx::query(
            "INSERT INTO users (id, name, email) VALUES ('u_dup', 'Dup', 'dup@launchpad.test')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO stripe_subscription
                (id, user_id, stripe_subscription_id, stripe_customer_id, stripe_price_id, status)
            VALUES ('s_1', 'u_dup', 'sub_dup', 'cus_dup', 'price_dup', 'active')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let mut state = AppState::for_tests(Config::for_tests());
        state.db = pool.clone();

        // Unique per run: markers outlive the test database.
        let failed_id = format!("evt_failed_{}", uuid::Uuid::new_v4());
        let paid_id = format!("evt_paid_{}", uuid::Uuid::new_v4());

        assert!(process_event(&state, &failed_id, settled(SubscriptionStatus::PastDue))
            .await
            .unwrap());
        assert_eq!(status(&pool).await, "past_due");

        assert!(process_event(&state, &paid_id, settled(SubscriptionStatus::Active))
            .await
            .unwrap());
        assert_eq!(status(&pool).await, "active");

        assert!(!process_event(&state, &failed_id, settled(SubscriptionStatus::PastDue))
            .await
            .unwrap());
        assert_eq!(status(&pool).await, "active");
    }
}
