//! Applies Stripe events to the local billing mirror and to user plans.
//!
//! Every handler is safe to replay: rows are upserted on their Stripe ids and
//! the donation total only moves in the transaction that inserts the payment.

use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::events::{
    resolve_plan, CheckoutCompletion, DonationRecord, PriceRecord, ProductRecord,
    SubscriptionRecord, WebhookEvent,
};
use crate::billing::upsert_customer;
use crate::errors::AppError;
use crate::models::{PaymentType, SubscriptionStatus, UserPlan};
use crate::roles::{downgrade_plan, record_donation, upgrade_plan};
use crate::stripe_client::StripeClient;

pub async fn apply_event(
    pool: &PgPool,
    stripe: &StripeClient,
    event: WebhookEvent,
) -> Result<(), AppError> {
    match event {
        WebhookEvent::CheckoutCompleted(checkout) => {
            checkout_completed(pool, stripe, &checkout).await
        }
        WebhookEvent::SubscriptionUpserted(subscription) => {
            upsert_subscription(pool, &subscription, None).await
        }
        WebhookEvent::SubscriptionDeleted { subscription_id } => {
            subscription_deleted(pool, &subscription_id).await
        }
        WebhookEvent::InvoiceSettled {
            invoice_id,
            subscription_id,
            status,
        } => match subscription_id {
            Some(subscription_id) => {
                invoice_status(pool, &invoice_id, &subscription_id, status).await
            }
            None => Ok(()),
        },
        WebhookEvent::ProductUpserted(product) => upsert_product(pool, &product).await,
        WebhookEvent::PriceUpserted(price) => upsert_price(pool, &price).await,
        WebhookEvent::Unhandled(event_type) => {
            info!("Unhandled event type: {}", event_type);
            Ok(())
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Checkout
// ────────────────────────────────────────────────────────────────────────────

async fn checkout_completed(
    pool: &PgPool,
    stripe: &StripeClient,
    checkout: &CheckoutCompletion,
) -> Result<(), AppError> {
    let Some(user_id) = checkout.user_id.as_deref() else {
        error!("No userId in checkout session {} metadata", checkout.session_id);
        return Ok(());
    };
    let Some(customer_id) = checkout.customer_id.as_deref() else {
        warn!("Checkout session {} has no customer", checkout.session_id);
        return Ok(());
    };

    let customer = stripe.retrieve_customer(customer_id).await?;
    if customer.deleted {
        info!(
            "Customer {} was deleted, skipping checkout {}",
            customer_id, checkout.session_id
        );
        return Ok(());
    }

    upsert_customer(
        pool,
        user_id,
        customer_id,
        customer.email.as_deref(),
        customer.name.as_deref(),
    )
    .await?;

    if let Some(subscription_id) = checkout.subscription_id.as_deref() {
        let subscription = stripe.retrieve_subscription(subscription_id).await?;
        return upsert_subscription(pool, &SubscriptionRecord::from(&subscription), Some(user_id))
            .await;
    }

    if let Some(donation) = checkout.donation() {
        if !record_donation_payment(pool, user_id, &donation).await? {
            info!("Donation {} already recorded", donation.payment_intent_id);
        }
    }

    Ok(())
}

/// Inserts the payment row and bumps the donor's totals in one transaction.
/// Returns `false` when the payment was already recorded, in which case the
/// totals are left alone.
pub async fn record_donation_payment(
    pool: &PgPool,
    user_id: &str,
    donation: &DonationRecord,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO stripe_payment
            (id, user_id, stripe_payment_intent_id, stripe_customer_id, amount,
             currency, status, payment_type, description, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, 'succeeded', $7, 'Donation', $8)
        ON CONFLICT (stripe_payment_intent_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&donation.payment_intent_id)
    .bind(&donation.customer_id)
    .bind(donation.amount)
    .bind(&donation.currency)
    .bind(PaymentType::Donation)
    .bind(&donation.metadata)
    .execute(&mut *tx)
    .await?;

    let inserted = result.rows_affected() > 0;
    if inserted {
        record_donation(&mut tx, user_id, donation.amount).await?;
    }

    tx.commit().await?;
    Ok(inserted)
}

// ────────────────────────────────────────────────────────────────────────────
// Subscriptions
// ────────────────────────────────────────────────────────────────────────────

async fn user_for_customer(pool: &PgPool, customer_id: &str) -> Result<Option<String>, AppError> {
    Ok(
        sqlx::query_scalar("SELECT user_id FROM stripe_customer WHERE stripe_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Plan granted by a price, via its product's metadata. Unknown prices grant `pro`.
async fn plan_for_price(pool: &PgPool, price_id: &str) -> Result<UserPlan, AppError> {
    let metadata: Option<Option<Value>> = sqlx::query_scalar(
        r#"
        SELECT p.metadata FROM stripe_price pr
        JOIN stripe_product p ON p.stripe_product_id = pr.stripe_product_id
        WHERE pr.stripe_price_id = $1
        "#,
    )
    .bind(price_id)
    .fetch_optional(pool)
    .await?;
    Ok(resolve_plan(metadata.flatten().as_ref()))
}

pub async fn upsert_subscription(
    pool: &PgPool,
    subscription: &SubscriptionRecord,
    user_id: Option<&str>,
) -> Result<(), AppError> {
    let user_id = match user_id {
        Some(id) => id.to_string(),
        None => match user_for_customer(pool, &subscription.customer_id).await? {
            Some(id) => id,
            None => {
                error!("No user found for subscription {}", subscription.subscription_id);
                return Ok(());
            }
        },
    };

    let Some(price_id) = subscription.price_id.as_deref() else {
        warn!("Subscription {} has no items", subscription.subscription_id);
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO stripe_subscription
            (id, user_id, stripe_subscription_id, stripe_customer_id, stripe_price_id,
             status, cancel_at_period_end, current_period_start, current_period_end,
             canceled_at, trial_start, trial_end, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (stripe_subscription_id) DO UPDATE SET
            stripe_price_id = EXCLUDED.stripe_price_id,
            status = EXCLUDED.status,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end,
            current_period_start = EXCLUDED.current_period_start,
            current_period_end = EXCLUDED.current_period_end,
            canceled_at = EXCLUDED.canceled_at,
            trial_start = EXCLUDED.trial_start,
            trial_end = EXCLUDED.trial_end,
            metadata = EXCLUDED.metadata,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user_id)
    .bind(&subscription.subscription_id)
    .bind(&subscription.customer_id)
    .bind(price_id)
    .bind(subscription.status.as_str())
    .bind(subscription.cancel_at_period_end)
    .bind(subscription.current_period_start)
    .bind(subscription.current_period_end)
    .bind(subscription.canceled_at)
    .bind(subscription.trial_start)
    .bind(subscription.trial_end)
    .bind(&subscription.metadata)
    .execute(pool)
    .await?;

    info!(
        "Synced subscription {} for user {} ({})",
        subscription.subscription_id,
        user_id,
        subscription.status.as_str()
    );

    if subscription.status.grants_access() {
        let plan = plan_for_price(pool, price_id).await?;
        upgrade_plan(pool, &user_id, plan).await?;
    }

    Ok(())
}

pub async fn subscription_deleted(pool: &PgPool, subscription_id: &str) -> Result<(), AppError> {
    let user_id: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE stripe_subscription
        SET status = 'canceled', canceled_at = NOW(), updated_at = NOW()
        WHERE stripe_subscription_id = $1
        RETURNING user_id
        "#,
    )
    .bind(subscription_id)
    .fetch_optional(pool)
    .await?;

    match user_id {
        Some(user_id) => downgrade_plan(pool, &user_id).await,
        None => {
            warn!("Deleted subscription {} is not tracked locally", subscription_id);
            Ok(())
        }
    }
}

pub async fn invoice_status(
    pool: &PgPool,
    invoice_id: &str,
    subscription_id: &str,
    status: SubscriptionStatus,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE stripe_subscription SET status = $1, updated_at = NOW() WHERE stripe_subscription_id = $2",
    )
    .bind(status.as_str())
    .bind(subscription_id)
    .execute(pool)
    .await?;

    info!(
        "Invoice {} set subscription {} to {}",
        invoice_id,
        subscription_id,
        status.as_str()
    );
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Catalog
// ────────────────────────────────────────────────────────────────────────────

pub async fn upsert_product(pool: &PgPool, product: &ProductRecord) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO stripe_product (id, stripe_product_id, name, description, active, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (stripe_product_id) DO UPDATE SET
            name = EXCLUDED.name,
            description = EXCLUDED.description,
            active = EXCLUDED.active,
            metadata = EXCLUDED.metadata,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&product.product_id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.active)
    .bind(&product.metadata)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_price(pool: &PgPool, price: &PriceRecord) -> Result<(), AppError> {
    let Some(product_id) = price.product_id.as_deref() else {
        warn!("Price {} has no product, skipping", price.price_id);
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO stripe_price
            (id, stripe_price_id, stripe_product_id, active, currency, unit_amount,
             type, interval, interval_count, trial_period_days, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (stripe_price_id) DO UPDATE SET
            active = EXCLUDED.active,
            currency = EXCLUDED.currency,
            unit_amount = EXCLUDED.unit_amount,
            type = EXCLUDED.type,
            interval = EXCLUDED.interval,
            interval_count = EXCLUDED.interval_count,
            trial_period_days = EXCLUDED.trial_period_days,
            metadata = EXCLUDED.metadata,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&price.price_id)
    .bind(product_id)
    .bind(price.active)
    .bind(&price.currency)
    .bind(price.unit_amount)
    .bind(&price.price_type)
    .bind(&price.interval)
    .bind(price.interval_count)
    .bind(price.trial_period_days)
    .bind(&price.metadata)
    .execute(pool)
    .await?;
    Ok(())
}
