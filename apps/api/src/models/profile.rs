use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

impl FromStr for UserRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            _ => Err(()),
        }
    }
}

/// Subscription tier. Paid tiers are driven by `metadata.plan` on Stripe products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_plan", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserPlan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl UserPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserPlan::Free => "free",
            UserPlan::Pro => "pro",
            UserPlan::Enterprise => "enterprise",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, UserPlan::Free)
    }
}

impl FromStr for UserPlan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(UserPlan::Free),
            "pro" => Ok(UserPlan::Pro),
            "enterprise" => Ok(UserPlan::Enterprise),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub role: UserRole,
    pub plan: UserPlan,
    /// Cents.
    pub total_donations: i64,
    /// Cents.
    pub lifetime_value: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [UserRole::Admin, UserRole::User] {
            assert_eq!(role.as_str().parse::<UserRole>(), Ok(role));
        }
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_plan_paid_flag() {
        assert!(!UserPlan::Free.is_paid());
        assert!(UserPlan::Pro.is_paid());
        assert!(UserPlan::Enterprise.is_paid());
        assert!("Pro".parse::<UserPlan>().is_err(), "parsing is case-sensitive");
    }

    #[test]
    fn test_defaults_match_new_profiles() {
        assert_eq!(UserRole::default(), UserRole::User);
        assert_eq!(UserPlan::default(), UserPlan::Free);
    }

    #[test]
    fn test_serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&UserPlan::Enterprise).unwrap(), "\"enterprise\"");
        assert_eq!(serde_json::to_string(&UserRole::Admin).unwrap(), "\"admin\"");
    }
}
