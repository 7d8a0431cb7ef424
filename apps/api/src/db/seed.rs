//! Development seed data. Every row has a fixed id and is inserted with
//! `ON CONFLICT DO NOTHING`, so seeding twice leaves the database unchanged.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::models::{UserPlan, UserRole};

pub const ADMIN_USER_ID: &str = "seed_user_admin";
pub const REGULAR_USER_ID: &str = "seed_user_regular";
pub const PAID_USER_ID: &str = "seed_user_paid";

const ADMIN_PROFILE_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_000000000001);
const REGULAR_PROFILE_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_000000000002);
const PAID_PROFILE_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_000000000003);

struct SeedUser {
    id: &'static str,
    name: &'static str,
    email: &'static str,
}

const USERS: [SeedUser; 3] = [
    SeedUser { id: ADMIN_USER_ID, name: "Admin User", email: "admin@example.com" },
    SeedUser { id: REGULAR_USER_ID, name: "Jane Doe", email: "jane@example.com" },
    SeedUser { id: PAID_USER_ID, name: "Pro User", email: "pro@example.com" },
];

struct SeedPrice {
    id: &'static str,
    stripe_price_id: &'static str,
    stripe_product_id: &'static str,
    unit_amount: i64,
    interval: &'static str,
}

const PRICES: [SeedPrice; 3] = [
    SeedPrice {
        id: "seed_price_pro_monthly",
        stripe_price_id: "price_seed_pro_monthly",
        stripe_product_id: "prod_seed_pro",
        unit_amount: 999,
        interval: "month",
    },
    SeedPrice {
        id: "seed_price_pro_yearly",
        stripe_price_id: "price_seed_pro_yearly",
        stripe_product_id: "prod_seed_pro",
        unit_amount: 9999,
        interval: "year",
    },
    SeedPrice {
        id: "seed_price_enterprise_monthly",
        stripe_price_id: "price_seed_enterprise_monthly",
        stripe_product_id: "prod_seed_enterprise",
        unit_amount: 2999,
        interval: "month",
    },
];

pub async fn seed(pool: &PgPool) -> Result<()> {
    info!("Seeding database...");
    let mut tx = pool.begin().await?;

    seed_users(&mut tx).await.context("Failed to seed users")?;
    seed_profiles(&mut tx).await.context("Failed to seed profiles")?;
    seed_catalog(&mut tx).await.context("Failed to seed products and prices")?;
    seed_billing(&mut tx).await.context("Failed to seed billing records")?;

    tx.commit().await?;
    info!(
        "Seed complete: {} users, {} prices",
        USERS.len(),
        PRICES.len()
    );
    Ok(())
}

async fn seed_users(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    for user in &USERS {
        sqlx::query(
            "INSERT INTO users (id, name, email, email_verified)
             VALUES ($1, $2, $3, TRUE)
             ON CONFLICT DO NOTHING",
        )
        .bind(user.id)
        .bind(user.name)
        .bind(user.email)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_profiles(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    let profiles = [
        (
            ADMIN_PROFILE_ID,
            ADMIN_USER_ID,
            "System administrator",
            None,
            UserRole::Admin,
            UserPlan::Free,
            0_i64,
            0_i64,
        ),
        (
            REGULAR_PROFILE_ID,
            REGULAR_USER_ID,
            "Regular user account",
            Some("San Francisco, CA"),
            UserRole::User,
            UserPlan::Free,
            500,
            500,
        ),
        (
            PAID_PROFILE_ID,
            PAID_USER_ID,
            "Pro plan subscriber",
            None,
            UserRole::User,
            UserPlan::Pro,
            0,
            999,
        ),
    ];

    for (id, user_id, bio, location, role, plan, total_donations, lifetime_value) in profiles {
        sqlx::query(
            "INSERT INTO user_profile
                (id, user_id, bio, location, role, plan, total_donations, lifetime_value)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(user_id)
        .bind(bio)
        .bind(location)
        .bind(role)
        .bind(plan)
        .bind(total_donations)
        .bind(lifetime_value)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_catalog(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    let products = [
        ("seed_product_pro", "prod_seed_pro", "Pro Plan", "Full access to all features", "pro"),
        (
            "seed_product_enterprise",
            "prod_seed_enterprise",
            "Enterprise Plan",
            "Priority support and custom integrations",
            "enterprise",
        ),
    ];

    for (id, stripe_id, name, description, plan) in products {
        sqlx::query(
            "INSERT INTO stripe_product (id, stripe_product_id, name, description, active, metadata)
             VALUES ($1, $2, $3, $4, TRUE, $5)
             ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(stripe_id)
        .bind(name)
        .bind(description)
        .bind(json!({ "plan": plan }))
        .execute(&mut **tx)
        .await?;
    }

    for price in &PRICES {
        sqlx::query(
            "INSERT INTO stripe_price
                (id, stripe_price_id, stripe_product_id, active, currency, unit_amount,
                 type, interval, interval_count)
             VALUES ($1, $2, $3, TRUE, 'usd', $4, 'recurring', $5, 1)
             ON CONFLICT DO NOTHING",
        )
        .bind(price.id)
        .bind(price.stripe_price_id)
        .bind(price.stripe_product_id)
        .bind(price.unit_amount)
        .bind(price.interval)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_billing(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query(
        "INSERT INTO stripe_customer (id, user_id, stripe_customer_id, email, name)
         VALUES ('seed_stripe_customer', $1, 'cus_seed_001', 'pro@example.com', 'Pro User')
         ON CONFLICT DO NOTHING",
    )
    .bind(PAID_USER_ID)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO stripe_subscription
            (id, user_id, stripe_subscription_id, stripe_customer_id, stripe_price_id,
             status, cancel_at_period_end, current_period_start, current_period_end)
         VALUES ('seed_subscription', $1, 'sub_seed_001', 'cus_seed_001',
                 'price_seed_pro_monthly', 'active', FALSE, NOW(), NOW() + INTERVAL '1 month')
         ON CONFLICT DO NOTHING",
    )
    .bind(PAID_USER_ID)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO stripe_payment
            (id, user_id, stripe_payment_intent_id, amount, currency, status,
             payment_type, description)
         VALUES ('seed_payment', $1, 'pi_seed_donation_001', 500, 'usd', 'succeeded',
                 'donation', 'Thank you donation')
         ON CONFLICT DO NOTHING",
    )
    .bind(REGULAR_USER_ID)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
