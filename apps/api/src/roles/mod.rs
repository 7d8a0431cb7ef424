//! Roles (permissions) and plans (subscription tiers).
//!
//! Role and plan are independent: an admin may be on the free plan, and a
//! paying user is still a plain `user`.

pub mod handlers;

use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

use crate::errors::AppError;
use crate::models::{UserPlan, UserProfile, UserRole};
use crate::validation::{validate_donation, validate_role_update, UpdateUserRoleInput};

/// Snapshot of a user's role and plan, as used by access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub role: UserRole,
    pub plan: UserPlan,
    pub total_donations: i64,
}

impl From<&UserProfile> for Access {
    fn from(profile: &UserProfile) -> Self {
        Access {
            role: profile.role,
            plan: profile.plan,
            total_donations: profile.total_donations,
        }
    }
}

impl Access {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn has_paid_access(&self) -> bool {
        self.is_admin() || self.plan.is_paid()
    }

    pub fn is_donor(&self) -> bool {
        self.is_admin() || self.total_donations > 0
    }
}

pub async fn find_profile(pool: &PgPool, user_id: &str) -> Result<Option<UserProfile>, AppError> {
    Ok(
        sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profile WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get_access(pool: &PgPool, user_id: &str) -> Result<Option<Access>, AppError> {
    Ok(find_profile(pool, user_id).await?.as_ref().map(Access::from))
}

/// `user` when the profile does not exist yet.
pub async fn get_role(pool: &PgPool, user_id: &str) -> Result<UserRole, AppError> {
    Ok(get_access(pool, user_id)
        .await?
        .map(|a| a.role)
        .unwrap_or_default())
}

/// `free` when the profile does not exist yet.
pub async fn get_plan(pool: &PgPool, user_id: &str) -> Result<UserPlan, AppError> {
    Ok(get_access(pool, user_id)
        .await?
        .map(|a| a.plan)
        .unwrap_or_default())
}

pub async fn has_role(pool: &PgPool, user_id: &str, role: UserRole) -> Result<bool, AppError> {
    Ok(get_role(pool, user_id).await? == role)
}

pub async fn is_admin(pool: &PgPool, user_id: &str) -> Result<bool, AppError> {
    has_role(pool, user_id, UserRole::Admin).await
}

/// Admin-only role change. Admins cannot demote themselves, so the last
/// admin can never lock everyone out.
pub async fn update_user_role(
    pool: &PgPool,
    actor_id: &str,
    input: &UpdateUserRoleInput,
) -> Result<UserProfile, AppError> {
    let (target_id, role) = validate_role_update(input)?;

    if !is_admin(pool, actor_id).await? {
        return Err(AppError::Forbidden(
            "Unauthorized - admin access required".to_string(),
        ));
    }
    if target_id == actor_id && role != UserRole::Admin {
        return Err(AppError::Validation(
            "Cannot demote yourself from admin".to_string(),
        ));
    }

    let profile = sqlx::query_as::<_, UserProfile>(
        "UPDATE user_profile SET role = $1, updated_at = NOW() WHERE user_id = $2 RETURNING *",
    )
    .bind(role)
    .bind(&target_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Profile for user {target_id} not found")))?;

    info!("User {} set role of {} to {}", actor_id, target_id, role.as_str());
    Ok(profile)
}

/// Creates the default profile (role `user`, plan `free`) if missing.
pub async fn ensure_user_profile(pool: &PgPool, user_id: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO user_profile (user_id, role, plan)
        VALUES ($1, 'user', 'free')
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upgrade_plan(pool: &PgPool, user_id: &str, plan: UserPlan) -> Result<(), AppError> {
    sqlx::query("UPDATE user_profile SET plan = $1, updated_at = NOW() WHERE user_id = $2")
        .bind(plan)
        .bind(user_id)
        .execute(pool)
        .await?;
    info!("Upgraded user {} to plan {}", user_id, plan.as_str());
    Ok(())
}

/// Moves a user back to `free`. Admins keep their plan.
pub async fn downgrade_plan(pool: &PgPool, user_id: &str) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE user_profile SET plan = 'free', updated_at = NOW()
        WHERE user_id = $1 AND role <> 'admin'
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    if result.rows_affected() > 0 {
        info!("Downgraded user {} to the free plan", user_id);
    }
    Ok(())
}

/// Adds a donation to the running totals, creating the profile if the user
/// has none yet. Runs inside the caller's transaction so the totals move
/// together with the payment row.
pub async fn record_donation(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    amount_in_cents: i64,
) -> Result<(), AppError> {
    validate_donation(user_id, amount_in_cents)?;
    sqlx::query(
        r#"
        INSERT INTO user_profile (user_id, total_donations, lifetime_value)
        VALUES ($2, $1, $1)
        ON CONFLICT (user_id) DO UPDATE SET
            total_donations = user_profile.total_donations + EXCLUDED.total_donations,
            lifetime_value = user_profile.lifetime_value + EXCLUDED.lifetime_value,
            updated_at = NOW()
        "#,
    )
    .bind(amount_in_cents)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    info!("Recorded donation of {} cents for user {}", amount_in_cents, user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(role: UserRole, plan: UserPlan, total_donations: i64) -> Access {
        Access {
            role,
            plan,
            total_donations,
        }
    }

    #[test]
    fn test_admin_always_has_paid_access() {
        assert!(access(UserRole::Admin, UserPlan::Free, 0).has_paid_access());
        assert!(access(UserRole::Admin, UserPlan::Free, 0).is_donor());
    }

    #[test]
    fn test_paid_access_follows_plan() {
        assert!(!access(UserRole::User, UserPlan::Free, 0).has_paid_access());
        assert!(access(UserRole::User, UserPlan::Pro, 0).has_paid_access());
        assert!(access(UserRole::User, UserPlan::Enterprise, 0).has_paid_access());
    }

    async fn insert_user(pool: &PgPool, id: &str) {
        sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $1, $1 || '@launchpad.test')")
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[sqlx::test]
    #[ignore]
    async fn test_donation_creates_missing_profile(pool: PgPool) {
        insert_user(&pool, "u_new").await;
        assert!(find_profile(&pool, "u_new").await.unwrap().is_none());

        let mut tx = pool.begin().await.unwrap();
        record_donation(&mut tx, "u_new", 1_200).await.unwrap();
        record_donation(&mut tx, "u_new", 300).await.unwrap();
        tx.commit().await.unwrap();

        let profile = find_profile(&pool, "u_new").await.unwrap().unwrap();
        assert_eq!(profile.total_donations, 1_500);
        assert_eq!(profile.lifetime_value, 1_500);
        assert_eq!(profile.role, UserRole::User);
        assert_eq!(profile.plan, UserPlan::Free);
    }

    #[sqlx::test]
    #[ignore]
    async fn test_downgrade_spares_admins(pool: PgPool) {
        insert_user(&pool, "u_admin").await;
        ensure_user_profile(&pool, "u_admin").await.unwrap();
        sqlx::query("UPDATE user_profile SET role = 'admin' WHERE user_id = 'u_admin'")
            .execute(&pool)
            .await
            .unwrap();

        upgrade_plan(&pool, "u_admin", UserPlan::Pro).await.unwrap();
        downgrade_plan(&pool, "u_admin").await.unwrap();
        assert_eq!(get_plan(&pool, "u_admin").await.unwrap(), UserPlan::Pro);
        assert!(is_admin(&pool, "u_admin").await.unwrap());
    }

    #[test]
    fn test_donor_requires_positive_total() {
        assert!(!access(UserRole::User, UserPlan::Pro, 0).is_donor());
        assert!(access(UserRole::User, UserPlan::Free, 500).is_donor());
    }
}
