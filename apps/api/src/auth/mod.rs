//! Google sign-in and cookie-backed sessions.

pub mod cookie;
pub mod extractor;
pub mod handlers;
pub mod oauth;
pub mod session;

pub use extractor::{AuthUser, MaybeAuthUser};

/// Sessions live for 7 days.
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// A session used with less than a day left is pushed back out to the full TTL.
pub const SESSION_REFRESH_THRESHOLD_SECS: i64 = 24 * 60 * 60;
/// Pending OAuth state lives for 10 minutes.
pub const OAUTH_STATE_TTL_SECS: u64 = 10 * 60;
