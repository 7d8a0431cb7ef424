use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use super::{delete_profile, upsert_profile};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::UserProfile;
use crate::roles::find_profile;
use crate::state::AppState;
use crate::validation::{validate_profile_update, UpdateProfileInput};

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Option<UserProfile>>, AppError> {
    Ok(Json(find_profile(&state.db, &auth.user.id).await?))
}

/// PUT /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Json<UserProfile>, AppError> {
    let fields = validate_profile_update(&input)?;
    let profile = upsert_profile(&state.db, &auth.user.id, &fields).await?;
    Ok(Json(profile))
}

/// DELETE /api/v1/profile
pub async fn handle_delete_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    if delete_profile(&state.db, &auth.user.id).await? {
        info!("User {} deleted their profile", auth.user.id);
    }
    Ok(StatusCode::NO_CONTENT)
}
