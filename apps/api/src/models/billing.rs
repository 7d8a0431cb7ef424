use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Subscription,
    Donation,
    #[default]
    OneTime,
}

/// Subscription lifecycle states as reported by Stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Paused,
    Trialing,
    Unpaid,
}

impl SubscriptionStatus {
    /// Unknown values are treated as `incomplete`.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "past_due" => SubscriptionStatus::PastDue,
            "paused" => SubscriptionStatus::Paused,
            "trialing" => SubscriptionStatus::Trialing,
            "unpaid" => SubscriptionStatus::Unpaid,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    /// Whether a subscription in this state entitles the user to its plan.
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StripeCustomer {
    pub id: String,
    pub user_id: String,
    pub stripe_customer_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StripeProduct {
    pub id: String,
    pub stripe_product_id: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StripePrice {
    pub id: String,
    pub stripe_price_id: String,
    pub stripe_product_id: String,
    pub active: bool,
    pub currency: String,
    pub unit_amount: Option<i64>,
    /// `one_time` or `recurring`
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub price_type: String,
    pub interval: Option<String>,
    pub interval_count: Option<i32>,
    pub trial_period_days: Option<i32>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StripeSubscription {
    pub id: String,
    pub user_id: String,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub stripe_price_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StripeSubscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StripePayment {
    pub id: String,
    pub user_id: String,
    pub stripe_payment_intent_id: String,
    pub stripe_customer_id: Option<String>,
    /// Cents.
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_type: PaymentType,
    pub description: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_and_trialing_grant_access() {
        let granting: Vec<_> = [
            "active",
            "canceled",
            "incomplete",
            "incomplete_expired",
            "past_due",
            "paused",
            "trialing",
            "unpaid",
        ]
        .iter()
        .map(|s| SubscriptionStatus::parse(s))
        .filter(|s| s.grants_access())
        .collect();
        assert_eq!(
            granting,
            vec![SubscriptionStatus::Active, SubscriptionStatus::Trialing]
        );
    }

    #[test]
    fn test_unknown_status_is_incomplete() {
        assert_eq!(
            SubscriptionStatus::parse("something_new"),
            SubscriptionStatus::Incomplete
        );
        assert_eq!(SubscriptionStatus::parse("past_due").as_str(), "past_due");
    }

    #[test]
    fn test_payment_type_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&PaymentType::OneTime).unwrap(), "\"one_time\"");
        assert_eq!(PaymentType::default(), PaymentType::OneTime);
    }
}
