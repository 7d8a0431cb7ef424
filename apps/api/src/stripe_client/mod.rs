//! Stripe client. Wraps `async-stripe` with the handful of calls the billing
//! flow needs (checkout and portal sessions, customers, subscriptions).

use std::collections::HashMap;

use stripe::{
    BillingPortalSession, CancelSubscription, CheckoutSession, CheckoutSessionMode, Client,
    CreateBillingPortalSession, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData, CreateCustomer, Customer, CustomerId, ListCustomers,
    RequestStrategy, Subscription, SubscriptionId, UpdateSubscription,
};
use thiserror::Error;
use tracing::debug;

/// Retries on 429/5xx with exponential backoff; each retry reuses the
/// idempotency key of the first attempt.
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Stripe is not configured")]
    NotConfigured,

    #[error("Stripe API error: {0}")]
    Api(#[from] stripe::StripeError),

    #[error("Invalid Stripe id: {0}")]
    InvalidId(String),
}

fn customer_id(id: &str) -> Result<CustomerId, StripeError> {
    id.parse()
        .map_err(|_| StripeError::InvalidId(id.to_string()))
}

fn subscription_id(id: &str) -> Result<SubscriptionId, StripeError> {
    id.parse()
        .map_err(|_| StripeError::InvalidId(id.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────
// Checkout options
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    pub price_id: String,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    /// Should carry the `{CHECKOUT_SESSION_ID}` placeholder if the landing
    /// page needs the session id.
    pub success_url: String,
    pub cancel_url: String,
    pub mode: Option<CheckoutSessionMode>,
    pub metadata: HashMap<String, String>,
    pub trial_period_days: Option<u32>,
}

/// Parameters for `CheckoutSession::create`.
///
/// - `customer` wins over `customer_email`
/// - trials only apply in subscription mode
pub fn checkout_params(options: &CheckoutOptions) -> Result<CreateCheckoutSession<'_>, StripeError> {
    let mode = options.mode.unwrap_or(CheckoutSessionMode::Subscription);

    let mut params = CreateCheckoutSession::new();
    params.mode = Some(mode);
    params.success_url = Some(options.success_url.as_str());
    params.cancel_url = Some(options.cancel_url.as_str());
    params.line_items = Some(vec![CreateCheckoutSessionLineItems {
        price: Some(options.price_id.clone()),
        quantity: Some(1),
        ..Default::default()
    }]);
    params.metadata = Some(options.metadata.clone());

    match (&options.customer_id, &options.customer_email) {
        (Some(id), _) => params.customer = Some(customer_id(id)?),
        (None, Some(email)) => params.customer_email = Some(email.as_str()),
        (None, None) => {}
    }

    if mode == CheckoutSessionMode::Subscription {
        if let Some(days) = options.trial_period_days.filter(|d| *d > 0) {
            params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
                trial_period_days: Some(days),
                ..Default::default()
            });
        }
    }

    Ok(params)
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Billing is optional: a client built without a secret key answers every
/// call with `StripeError::NotConfigured`.
#[derive(Clone)]
pub struct StripeClient {
    inner: Option<Client>,
}

impl StripeClient {
    pub fn new(secret_key: Option<String>) -> Self {
        Self {
            inner: secret_key.map(|key| {
                Client::new(key).with_strategy(RequestStrategy::ExponentialBackoff(MAX_RETRIES))
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    pub fn inner(&self) -> Result<&Client, StripeError> {
        self.inner.as_ref().ok_or(StripeError::NotConfigured)
    }

    pub async fn create_checkout_session(
        &self,
        options: &CheckoutOptions,
    ) -> Result<CheckoutSession, StripeError> {
        let client = self.inner()?;
        let session = CheckoutSession::create(client, checkout_params(options)?).await?;
        debug!("Created checkout session {}", session.id);
        Ok(session)
    }

    pub async fn create_portal_session(
        &self,
        customer: &str,
        return_url: &str,
    ) -> Result<BillingPortalSession, StripeError> {
        let client = self.inner()?;
        let mut params = CreateBillingPortalSession::new(customer_id(customer)?);
        params.return_url = Some(return_url);
        Ok(BillingPortalSession::create(client, params).await?)
    }

    /// Returns the first customer with this email, creating one if none exists.
    pub async fn get_or_create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<Customer, StripeError> {
        let client = self.inner()?;

        let mut list = ListCustomers::new();
        list.email = Some(email);
        list.limit = Some(1);
        if let Some(customer) = Customer::list(client, &list).await?.data.into_iter().next() {
            return Ok(customer);
        }

        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.name = name;
        Ok(Customer::create(client, params).await?)
    }

    /// Deleted customers come back with `deleted: true` rather than a 404.
    pub async fn retrieve_customer(&self, id: &str) -> Result<Customer, StripeError> {
        let client = self.inner()?;
        Ok(Customer::retrieve(client, &customer_id(id)?, &[]).await?)
    }

    pub async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, StripeError> {
        let client = self.inner()?;
        Ok(Subscription::retrieve(client, &subscription_id(id)?, &[]).await?)
    }

    /// Cancels at period end unless `immediately`, so the user keeps access
    /// for the time already paid.
    pub async fn cancel_subscription(
        &self,
        id: &str,
        immediately: bool,
    ) -> Result<Subscription, StripeError> {
        let client = self.inner()?;
        let id = subscription_id(id)?;
        if immediately {
            Ok(Subscription::cancel(client, &id, CancelSubscription::new()).await?)
        } else {
            let mut params = UpdateSubscription::new();
            params.cancel_at_period_end = Some(true);
            Ok(Subscription::update(client, &id, params).await?)
        }
    }

    /// Undoes a pending cancel-at-period-end.
    pub async fn resume_subscription(&self, id: &str) -> Result<Subscription, StripeError> {
        let client = self.inner()?;
        let mut params = UpdateSubscription::new();
        params.cancel_at_period_end = Some(false);
        Ok(Subscription::update(client, &subscription_id(id)?, params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CheckoutOptions {
        CheckoutOptions {
            price_id: "price_123".into(),
            customer_id: Some("cus_1".into()),
            customer_email: Some("a@example.com".into()),
            success_url: "https://app.test/checkout/success".into(),
            cancel_url: "https://app.test/pricing".into(),
            metadata: HashMap::from([
                ("type".to_string(), "subscription".to_string()),
                ("userId".to_string(), "u_1".to_string()),
            ]),
            trial_period_days: Some(14),
            ..Default::default()
        }
    }

    #[test]
    fn test_checkout_params_basics() {
        let options = options();
        let params = checkout_params(&options).unwrap();
        assert_eq!(params.mode, Some(CheckoutSessionMode::Subscription));
        assert_eq!(params.success_url, Some("https://app.test/checkout/success"));
        assert_eq!(params.cancel_url, Some("https://app.test/pricing"));

        let items = params.line_items.as_ref().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price.as_deref(), Some("price_123"));
        assert_eq!(items[0].quantity, Some(1));

        let metadata = params.metadata.as_ref().unwrap();
        assert_eq!(metadata["userId"], "u_1");
        assert_eq!(metadata["type"], "subscription");
        assert_eq!(
            params
                .subscription_data
                .as_ref()
                .and_then(|d| d.trial_period_days),
            Some(14)
        );
    }

    #[test]
    fn test_customer_id_wins_over_email() {
        let with_customer = options();
        let params = checkout_params(&with_customer).unwrap();
        assert_eq!(params.customer.as_ref().map(|c| c.as_str()), Some("cus_1"));
        assert_eq!(params.customer_email, None);

        let email_only = CheckoutOptions {
            customer_id: None,
            ..options()
        };
        let params = checkout_params(&email_only).unwrap();
        assert!(params.customer.is_none());
        assert_eq!(params.customer_email, Some("a@example.com"));
    }

    #[test]
    fn test_trial_ignored_for_one_time_payments() {
        let options = CheckoutOptions {
            mode: Some(CheckoutSessionMode::Payment),
            ..options()
        };
        let params = checkout_params(&options).unwrap();
        assert_eq!(params.mode, Some(CheckoutSessionMode::Payment));
        assert!(params.subscription_data.is_none());
    }

    #[test]
    fn test_malformed_customer_id_is_rejected() {
        let options = CheckoutOptions {
            customer_id: Some("not-a-customer".into()),
            ..options()
        };
        assert!(matches!(
            checkout_params(&options),
            Err(StripeError::InvalidId(id)) if id == "not-a-customer"
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses_calls() {
        let client = StripeClient::new(None);
        assert!(!client.is_configured());
        let err = client.retrieve_customer("cus_1").await.unwrap_err();
        assert!(matches!(err, StripeError::NotConfigured));
    }
}
