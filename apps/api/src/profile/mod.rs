//! The signed-in user's own profile.

pub mod handlers;

use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::UserProfile;
use crate::validation::ProfileFields;

/// Inserts or updates the editable profile fields. Role, plan and totals are
/// left untouched on update and defaulted on insert.
pub async fn upsert_profile(
    pool: &PgPool,
    user_id: &str,
    fields: &ProfileFields,
) -> Result<UserProfile, AppError> {
    Ok(sqlx::query_as::<_, UserProfile>(
        r#"
        INSERT INTO user_profile (user_id, bio, location, website)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO UPDATE SET
            bio = EXCLUDED.bio,
            location = EXCLUDED.location,
            website = EXCLUDED.website,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&fields.bio)
    .bind(&fields.location)
    .bind(&fields.website)
    .fetch_one(pool)
    .await?)
}

pub async fn delete_profile(pool: &PgPool, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM user_profile WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
