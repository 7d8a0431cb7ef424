//! Billing actions taken by a signed-in user: checkout, customer portal,
//! subscription cancel/resume, and donation history.
//!
//! Local Stripe rows are written by the webhook; the only write here is the
//! customer mapping created before the first checkout.

pub mod handlers;

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use stripe::CheckoutSessionMode;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    StripeCustomer, StripePayment, StripePrice, StripeProduct, StripeSubscription, User,
};
use crate::stripe_client::{CheckoutOptions, StripeClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    Subscription,
    Donation,
}

impl CheckoutKind {
    /// Value stored in `metadata.type`, read back by the webhook.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutKind::Subscription => "subscription",
            CheckoutKind::Donation => "donation",
        }
    }

    fn mode(&self) -> CheckoutSessionMode {
        match self {
            CheckoutKind::Subscription => CheckoutSessionMode::Subscription,
            CheckoutKind::Donation => CheckoutSessionMode::Payment,
        }
    }

    fn success_path(&self) -> &'static str {
        match self {
            CheckoutKind::Subscription => "/checkout/success",
            CheckoutKind::Donation => "/donate/thank-you",
        }
    }

    fn cancel_path(&self) -> &'static str {
        match self {
            CheckoutKind::Subscription => "/pricing",
            CheckoutKind::Donation => "/donate",
        }
    }
}

pub fn checkout_options(
    config: &Config,
    kind: CheckoutKind,
    price_id: &str,
    customer_id: &str,
    user_id: &str,
) -> CheckoutOptions {
    CheckoutOptions {
        price_id: price_id.to_string(),
        customer_id: Some(customer_id.to_string()),
        customer_email: None,
        success_url: format!(
            "{}?session_id={{CHECKOUT_SESSION_ID}}",
            config.app_link(kind.success_path())
        ),
        cancel_url: config.app_link(kind.cancel_path()),
        mode: Some(kind.mode()),
        metadata: HashMap::from([
            ("userId".to_string(), user_id.to_string()),
            ("type".to_string(), kind.as_str().to_string()),
        ]),
        trial_period_days: None,
    }
}

pub fn require_stripe(stripe: &StripeClient) -> Result<(), AppError> {
    if stripe.is_configured() {
        Ok(())
    } else {
        Err(AppError::BillingUnavailable)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Queries
// ────────────────────────────────────────────────────────────────────────────

pub async fn find_customer(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<StripeCustomer>, AppError> {
    Ok(
        sqlx::query_as::<_, StripeCustomer>("SELECT * FROM stripe_customer WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Maps a user to a Stripe customer, replacing any previous mapping.
pub async fn upsert_customer(
    pool: &PgPool,
    user_id: &str,
    stripe_customer_id: &str,
    email: Option<&str>,
    name: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO stripe_customer (id, user_id, stripe_customer_id, email, name)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            stripe_customer_id = EXCLUDED.stripe_customer_id,
            email = EXCLUDED.email,
            name = EXCLUDED.name,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(stripe_customer_id)
    .bind(email)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

/// The user's most recent subscription.
pub async fn find_subscription(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<StripeSubscription>, AppError> {
    Ok(sqlx::query_as::<_, StripeSubscription>(
        "SELECT * FROM stripe_subscription WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn list_donations(pool: &PgPool, user_id: &str) -> Result<Vec<StripePayment>, AppError> {
    Ok(sqlx::query_as::<_, StripePayment>(
        r#"
        SELECT * FROM stripe_payment
        WHERE user_id = $1 AND payment_type = 'donation'
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

/// Sum of donation amounts in cents.
pub async fn total_donations(pool: &PgPool, user_id: &str) -> Result<i64, AppError> {
    Ok(sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(amount), 0)::BIGINT FROM stripe_payment
        WHERE user_id = $1 AND payment_type = 'donation'
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?)
}

/// An active product and its active prices, cheapest first.
#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub product: StripeProduct,
    pub prices: Vec<StripePrice>,
}

/// Attaches each price to its product. Prices whose product is not in
/// `products` are dropped.
pub fn group_catalog(products: Vec<StripeProduct>, prices: Vec<StripePrice>) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = products
        .into_iter()
        .map(|product| CatalogEntry {
            product,
            prices: Vec::new(),
        })
        .collect();

    for price in prices {
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.product.stripe_product_id == price.stripe_product_id)
        {
            entry.prices.push(price);
        }
    }
    entries
}

/// Active catalog mirrored from Stripe, for the pricing page.
pub async fn list_catalog(pool: &PgPool) -> Result<Vec<CatalogEntry>, AppError> {
    let products = sqlx::query_as::<_, StripeProduct>(
        "SELECT * FROM stripe_product WHERE active ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let prices = sqlx::query_as::<_, StripePrice>(
        "SELECT * FROM stripe_price WHERE active ORDER BY unit_amount NULLS LAST",
    )
    .fetch_all(pool)
    .await?;

    Ok(group_catalog(products, prices))
}

// ────────────────────────────────────────────────────────────────────────────
// Actions
// ────────────────────────────────────────────────────────────────────────────

/// Returns the user's Stripe customer id, creating the customer on first use.
pub async fn get_or_create_stripe_customer(
    pool: &PgPool,
    stripe: &StripeClient,
    user: &User,
) -> Result<String, AppError> {
    if let Some(existing) = find_customer(pool, &user.id).await? {
        return Ok(existing.stripe_customer_id);
    }

    let customer = stripe
        .get_or_create_customer(&user.email, Some(&user.name))
        .await?;
    let customer_id = customer.id.to_string();
    upsert_customer(pool, &user.id, &customer_id, Some(&user.email), Some(&user.name)).await?;

    info!("Linked user {} to Stripe customer {}", user.id, customer_id);
    Ok(customer_id)
}

/// Creates a hosted checkout session and returns its URL.
pub async fn create_checkout(
    pool: &PgPool,
    stripe: &StripeClient,
    config: &Config,
    user: &User,
    kind: CheckoutKind,
    price_id: &str,
) -> Result<String, AppError> {
    require_stripe(stripe)?;
    crate::validation::non_empty("price_id", price_id)?;
    crate::roles::ensure_user_profile(pool, &user.id).await?;

    let customer_id = get_or_create_stripe_customer(pool, stripe, user).await?;
    let options = checkout_options(config, kind, price_id, &customer_id, &user.id);
    let session = stripe.create_checkout_session(&options).await?;

    info!(
        "Created {} checkout session {} for user {}",
        kind.as_str(),
        session.id,
        user.id
    );
    session
        .url
        .ok_or_else(|| anyhow::anyhow!("Failed to create checkout session").into())
}

/// Customer portal URL, or the pricing page for users who never checked out.
pub async fn portal_url(
    pool: &PgPool,
    stripe: &StripeClient,
    config: &Config,
    user_id: &str,
) -> Result<String, AppError> {
    require_stripe(stripe)?;
    let Some(customer) = find_customer(pool, user_id).await? else {
        return Ok(config.app_link("/pricing"));
    };
    let session = stripe
        .create_portal_session(&customer.stripe_customer_id, &config.app_link("/account"))
        .await?;
    Ok(session.url)
}

fn no_subscription() -> AppError {
    AppError::NotFound("No subscription found".to_string())
}

pub async fn cancel_subscription(
    pool: &PgPool,
    stripe: &StripeClient,
    user_id: &str,
    immediately: bool,
) -> Result<(), AppError> {
    require_stripe(stripe)?;
    let subscription = find_subscription(pool, user_id)
        .await?
        .ok_or_else(no_subscription)?;
    stripe
        .cancel_subscription(&subscription.stripe_subscription_id, immediately)
        .await?;
    info!(
        "User {} canceled subscription {} (immediately: {})",
        user_id, subscription.stripe_subscription_id, immediately
    );
    Ok(())
}

pub async fn resume_subscription(
    pool: &PgPool,
    stripe: &StripeClient,
    user_id: &str,
) -> Result<(), AppError> {
    require_stripe(stripe)?;
    let subscription = find_subscription(pool, user_id)
        .await?
        .ok_or_else(no_subscription)?;
    if !subscription.cancel_at_period_end {
        return Err(AppError::Validation(
            "Subscription is not set to cancel".to_string(),
        ));
    }
    stripe
        .resume_subscription(&subscription.stripe_subscription_id)
        .await?;
    info!(
        "User {} resumed subscription {}",
        user_id, subscription.stripe_subscription_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_checkout_options() {
        let config = Config::for_tests();
        let options = checkout_options(
            &config,
            CheckoutKind::Subscription,
            "price_pro",
            "cus_1",
            "u_1",
        );
        assert_eq!(options.mode, Some(CheckoutSessionMode::Subscription));
        assert_eq!(
            options.success_url,
            "http://localhost:3000/checkout/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(options.cancel_url, "http://localhost:3000/pricing");
        assert_eq!(options.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(options.metadata["userId"], "u_1");
        assert_eq!(options.metadata["type"], "subscription");
    }

    #[test]
    fn test_donation_checkout_is_one_time_payment() {
        let config = Config::for_tests();
        let options = checkout_options(&config, CheckoutKind::Donation, "price_5", "cus_1", "u_1");
        assert_eq!(options.mode, Some(CheckoutSessionMode::Payment));
        assert_eq!(
            options.success_url,
            "http://localhost:3000/donate/thank-you?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(options.cancel_url, "http://localhost:3000/donate");
        assert_eq!(options.metadata["type"], "donation");
    }

    fn product(id: &str, name: &str) -> StripeProduct {
        let now = chrono::Utc::now();
        StripeProduct {
            id: format!("local_{id}"),
            stripe_product_id: id.to_string(),
            name: name.to_string(),
            description: None,
            active: true,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn price(id: &str, product_id: &str, unit_amount: i64) -> StripePrice {
        let now = chrono::Utc::now();
        StripePrice {
            id: format!("local_{id}"),
            stripe_price_id: id.to_string(),
            stripe_product_id: product_id.to_string(),
            active: true,
            currency: "usd".to_string(),
            unit_amount: Some(unit_amount),
            price_type: "recurring".to_string(),
            interval: Some("month".to_string()),
            interval_count: Some(1),
            trial_period_days: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_group_catalog() {
        let catalog = group_catalog(
            vec![product("prod_ent", "Enterprise"), product("prod_pro", "Pro")],
            vec![
                price("price_pro_m", "prod_pro", 999),
                price("price_ent_m", "prod_ent", 2999),
                price("price_pro_y", "prod_pro", 9999),
                price("price_orphan", "prod_archived", 100),
            ],
        );
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].prices.len(), 1);
        let pro_prices: Vec<_> = catalog[1]
            .prices
            .iter()
            .map(|p| p.stripe_price_id.as_str())
            .collect();
        assert_eq!(pro_prices, ["price_pro_m", "price_pro_y"]);

        let json = serde_json::to_value(&catalog[1]).unwrap();
        assert_eq!(json["name"], "Pro");
        assert_eq!(json["prices"][0]["type"], "recurring");
    }

    #[test]
    fn test_actions_require_stripe() {
        let err = require_stripe(&StripeClient::new(None)).unwrap_err();
        assert!(matches!(err, AppError::BillingUnavailable));
        assert!(require_stripe(&StripeClient::new(Some("sk_test".into()))).is_ok());
    }
}
