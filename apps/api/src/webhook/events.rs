//! The Stripe events the reconciler acts on, reduced to the values written
//! to the local mirror.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use stripe::{CheckoutSession, Event, EventObject, EventType, Invoice, Price, Product, Subscription};

use crate::models::{SubscriptionStatus, UserPlan};
use crate::validation::parse_plan;

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutCompletion),
    SubscriptionUpserted(SubscriptionRecord),
    SubscriptionDeleted { subscription_id: String },
    InvoiceSettled {
        invoice_id: String,
        subscription_id: Option<String>,
        status: SubscriptionStatus,
    },
    ProductUpserted(ProductRecord),
    PriceUpserted(PriceRecord),
    Unhandled(String),
}

impl WebhookEvent {
    pub fn from_stripe(event: Event) -> Self {
        match (event.type_, event.data.object) {
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => {
                WebhookEvent::CheckoutCompleted(CheckoutCompletion::from(&session))
            }
            (
                EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated,
                EventObject::Subscription(subscription),
            ) => WebhookEvent::SubscriptionUpserted(SubscriptionRecord::from(&subscription)),
            (EventType::CustomerSubscriptionDeleted, EventObject::Subscription(subscription)) => {
                WebhookEvent::SubscriptionDeleted {
                    subscription_id: subscription.id.to_string(),
                }
            }
            (EventType::InvoicePaid, EventObject::Invoice(invoice)) => {
                invoice_settled(&invoice, SubscriptionStatus::Active)
            }
            (EventType::InvoicePaymentFailed, EventObject::Invoice(invoice)) => {
                invoice_settled(&invoice, SubscriptionStatus::PastDue)
            }
            (
                EventType::ProductCreated | EventType::ProductUpdated,
                EventObject::Product(product),
            ) => WebhookEvent::ProductUpserted(ProductRecord::from(&product)),
            (EventType::PriceCreated | EventType::PriceUpdated, EventObject::Price(price)) => {
                WebhookEvent::PriceUpserted(PriceRecord::from(&price))
            }
            (event_type, _) => WebhookEvent::Unhandled(event_type.to_string()),
        }
    }
}

fn invoice_settled(invoice: &Invoice, status: SubscriptionStatus) -> WebhookEvent {
    WebhookEvent::InvoiceSettled {
        invoice_id: invoice.id.to_string(),
        subscription_id: invoice.subscription.as_ref().map(|s| s.id().to_string()),
        status,
    }
}

/// What a completed checkout tells us. The customer and subscription are
/// re-read from Stripe before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutCompletion {
    pub session_id: String,
    pub user_id: Option<String>,
    pub checkout_type: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Cents.
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

impl CheckoutCompletion {
    /// The donation carried by this checkout, if it is one with a positive amount.
    pub fn donation(&self) -> Option<DonationRecord> {
        if self.checkout_type.as_deref() != Some("donation") {
            return None;
        }
        let payment_intent_id = self.payment_intent_id.clone()?;
        let customer_id = self.customer_id.clone()?;
        let amount = self.amount_total.filter(|amount| *amount > 0)?;
        Some(DonationRecord {
            payment_intent_id,
            customer_id,
            amount,
            currency: self.currency.clone().unwrap_or_else(|| "usd".to_string()),
            metadata: self.metadata.clone(),
        })
    }
}

impl From<&CheckoutSession> for CheckoutCompletion {
    fn from(session: &CheckoutSession) -> Self {
        let metadata_value = |key: &str| {
            session
                .metadata
                .as_ref()
                .and_then(|m| m.get(key))
                .cloned()
        };
        CheckoutCompletion {
            session_id: session.id.to_string(),
            user_id: metadata_value("userId"),
            checkout_type: metadata_value("type"),
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
            payment_intent_id: session.payment_intent.as_ref().map(|p| p.id().to_string()),
            amount_total: session.amount_total,
            currency: session.currency.as_ref().map(|c| c.to_string()),
            metadata: session.metadata.as_ref().map(metadata_json),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonationRecord {
    pub payment_intent_id: String,
    pub customer_id: String,
    /// Cents.
    pub amount: i64,
    pub currency: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    pub customer_id: String,
    /// First item's price; subscriptions here always have a single item.
    pub price_id: Option<String>,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

impl From<&Subscription> for SubscriptionRecord {
    fn from(subscription: &Subscription) -> Self {
        SubscriptionRecord {
            subscription_id: subscription.id.to_string(),
            customer_id: subscription.customer.id().to_string(),
            price_id: subscription
                .items
                .data
                .first()
                .and_then(|item| item.price.as_ref())
                .map(|price| price.id.to_string()),
            status: SubscriptionStatus::parse(subscription.status.as_str()),
            cancel_at_period_end: subscription.cancel_at_period_end,
            current_period_start: unix_to_datetime(subscription.current_period_start),
            current_period_end: unix_to_datetime(subscription.current_period_end),
            canceled_at: subscription.canceled_at.and_then(unix_to_datetime),
            trial_start: subscription.trial_start.and_then(unix_to_datetime),
            trial_end: subscription.trial_end.and_then(unix_to_datetime),
            metadata: Some(metadata_json(&subscription.metadata)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub product_id: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub metadata: Option<Value>,
}

impl From<&Product> for ProductRecord {
    fn from(product: &Product) -> Self {
        ProductRecord {
            product_id: product.id.to_string(),
            name: product.name.clone().unwrap_or_default(),
            description: product.description.clone(),
            active: product.active.unwrap_or(true),
            metadata: product.metadata.as_ref().map(metadata_json),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub price_id: String,
    pub product_id: Option<String>,
    pub active: bool,
    pub currency: String,
    pub unit_amount: Option<i64>,
    /// `one_time` or `recurring`
    pub price_type: String,
    pub interval: Option<String>,
    pub interval_count: Option<i32>,
    pub trial_period_days: Option<i32>,
    pub metadata: Option<Value>,
}

impl From<&Price> for PriceRecord {
    fn from(price: &Price) -> Self {
        let recurring = price.recurring.as_ref();
        PriceRecord {
            price_id: price.id.to_string(),
            product_id: price.product.as_ref().map(|p| p.id().to_string()),
            active: price.active.unwrap_or(true),
            currency: price
                .currency
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "usd".to_string()),
            unit_amount: price.unit_amount,
            price_type: price
                .type_
                .as_ref()
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "one_time".to_string()),
            interval: recurring.map(|r| r.interval.as_str().to_string()),
            interval_count: recurring.and_then(|r| i32::try_from(r.interval_count).ok()),
            trial_period_days: recurring
                .and_then(|r| r.trial_period_days)
                .and_then(|days| i32::try_from(days).ok()),
            metadata: price.metadata.as_ref().map(metadata_json),
        }
    }
}

pub fn metadata_json(metadata: &HashMap<String, String>) -> Value {
    Value::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Tier granted by a product, read from its `metadata.plan`.
/// Anything other than `pro` or `enterprise` falls back to `pro`.
pub fn resolve_plan(product_metadata: Option<&Value>) -> UserPlan {
    match product_metadata
        .and_then(|m| m.get("plan"))
        .and_then(Value::as_str)
        .map(parse_plan)
    {
        Some(Ok(UserPlan::Enterprise)) => UserPlan::Enterprise,
        _ => UserPlan::Pro,
    }
}

pub fn unix_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(checkout_type: &str, amount_total: Option<i64>) -> CheckoutCompletion {
        CheckoutCompletion {
            session_id: "cs_1".into(),
            user_id: Some("u_1".into()),
            checkout_type: Some(checkout_type.into()),
            customer_id: Some("cus_1".into()),
            subscription_id: None,
            payment_intent_id: Some("pi_1".into()),
            amount_total,
            currency: None,
            metadata: Some(json!({"type": checkout_type, "userId": "u_1"})),
        }
    }

    #[test]
    fn test_donation_from_completed_checkout() {
        let donation = completion("donation", Some(2_500)).donation().unwrap();
        assert_eq!(donation.payment_intent_id, "pi_1");
        assert_eq!(donation.customer_id, "cus_1");
        assert_eq!(donation.amount, 2_500);
        assert_eq!(donation.currency, "usd");
    }

    #[test]
    fn test_zero_or_missing_amount_is_not_a_donation() {
        assert!(completion("donation", Some(0)).donation().is_none());
        assert!(completion("donation", None).donation().is_none());
    }

    #[test]
    fn test_subscription_checkout_is_not_a_donation() {
        assert!(completion("subscription", Some(999)).donation().is_none());

        let mut without_intent = completion("donation", Some(500));
        without_intent.payment_intent_id = None;
        assert!(without_intent.donation().is_none());
    }

    #[test]
    fn test_metadata_json() {
        let metadata = HashMap::from([("plan".to_string(), "pro".to_string())]);
        assert_eq!(metadata_json(&metadata), json!({"plan": "pro"}));
        assert_eq!(metadata_json(&HashMap::new()), json!({}));
    }

    #[test]
    fn test_resolve_plan() {
        assert_eq!(resolve_plan(Some(&json!({"plan": "enterprise"}))), UserPlan::Enterprise);
        assert_eq!(resolve_plan(Some(&json!({"plan": "pro"}))), UserPlan::Pro);
        assert_eq!(resolve_plan(Some(&json!({"plan": "free"}))), UserPlan::Pro);
        assert_eq!(resolve_plan(Some(&json!({}))), UserPlan::Pro);
        assert_eq!(resolve_plan(None), UserPlan::Pro);
    }

    #[test]
    fn test_unix_to_datetime() {
        let dt = unix_to_datetime(1_700_000_000).unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }
}
