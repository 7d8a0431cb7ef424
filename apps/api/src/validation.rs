//! Input validation for profile, role and billing payloads.
//!
//! Every validator collects all field failures and reports them as one
//! message: `"<field>: <message>, <field>: <message>"`.

use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{UserPlan, UserRole};

const BIO_MAX: usize = 500;
const LOCATION_MAX: usize = 100;
const WEBSITE_MAX: usize = 255;

#[derive(Debug, Default)]
struct FieldErrors(Vec<(&'static str, String)>);

impl FieldErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push((field, message.into()));
    }

    fn finish<T>(self, value: T) -> Result<T, AppError> {
        if self.0.is_empty() {
            return Ok(value);
        }
        let message = self
            .0
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(AppError::Validation(message))
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn is_http_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

// ────────────────────────────────────────────────────────────────────────────
// Profile
// ────────────────────────────────────────────────────────────────────────────

/// Body of `PUT /api/v1/profile`. Absent, null and empty fields all clear the column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Validated profile fields, with empty strings normalized to `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileFields {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

pub fn validate_profile_update(input: &UpdateProfileInput) -> Result<ProfileFields, AppError> {
    let mut errors = FieldErrors::default();

    if let Some(bio) = &input.bio {
        if char_len(bio) > BIO_MAX {
            errors.push("bio", "Bio must be 500 characters or less");
        }
    }
    if let Some(location) = &input.location {
        if char_len(location) > LOCATION_MAX {
            errors.push("location", "Location must be 100 characters or less");
        }
    }
    if let Some(website) = input.website.as_deref().filter(|w| !w.is_empty()) {
        if !is_http_url(website) {
            errors.push("website", "Must be a valid URL");
        }
        if char_len(website) > WEBSITE_MAX {
            errors.push("website", "URL must be 255 characters or less");
        }
    }

    let blank_to_none = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
    errors.finish(ProfileFields {
        bio: blank_to_none(&input.bio),
        location: blank_to_none(&input.location),
        website: blank_to_none(&input.website),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Roles, plans, donations
// ────────────────────────────────────────────────────────────────────────────

pub fn parse_role(value: &str) -> Result<UserRole, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Validation("role: Invalid role".to_string()))
}

pub fn parse_plan(value: &str) -> Result<UserPlan, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Validation("plan: Invalid plan".to_string()))
}

pub fn non_empty<'a>(field: &'static str, value: &'a str) -> Result<&'a str, AppError> {
    let mut errors = FieldErrors::default();
    if value.is_empty() {
        errors.push(field, "Cannot be empty");
    }
    errors.finish(value)
}

/// Admin request to change another user's role.
#[derive(Debug, Clone)]
pub struct UpdateUserRoleInput {
    pub user_id: String,
    pub role: String,
}

pub fn validate_role_update(input: &UpdateUserRoleInput) -> Result<(String, UserRole), AppError> {
    let mut errors = FieldErrors::default();
    if input.user_id.is_empty() {
        errors.push("userId", "User ID is required");
    }
    let role = parse_role(&input.role).ok();
    if role.is_none() {
        errors.push("role", "Invalid role");
    }
    errors.finish(())?;
    Ok((input.user_id.clone(), role.unwrap_or_default()))
}

pub fn validate_donation(user_id: &str, amount_in_cents: i64) -> Result<(), AppError> {
    let mut errors = FieldErrors::default();
    if user_id.is_empty() {
        errors.push("userId", "User ID is required");
    }
    if amount_in_cents <= 0 {
        errors.push("amountInCents", "Amount must be positive");
    }
    errors.finish(())
}
