pub mod billing;
pub mod profile;
pub mod user;

pub use billing::{
    PaymentType, StripeCustomer, StripePayment, StripePrice, StripeProduct, StripeSubscription,
    SubscriptionStatus,
};
pub use profile::{UserPlan, UserProfile, UserRole};
pub use user::{Account, Session, User};
