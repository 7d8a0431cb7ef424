use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{get_access, update_user_role};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{UserPlan, UserProfile, UserRole};
use crate::state::AppState;
use crate::validation::UpdateUserRoleInput;

#[derive(Serialize)]
pub struct RoleResponse {
    pub role: UserRole,
}

#[derive(Serialize)]
pub struct PlanResponse {
    pub plan: UserPlan,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AccessResponse {
    pub role: UserRole,
    pub plan: UserPlan,
    pub is_admin: bool,
    pub has_paid_access: bool,
    pub is_donor: bool,
}

impl AccessResponse {
    /// Users without a profile get the defaults and no access flags.
    fn from_access(access: Option<super::Access>) -> Self {
        match access {
            Some(a) => AccessResponse {
                role: a.role,
                plan: a.plan,
                is_admin: a.is_admin(),
                has_paid_access: a.has_paid_access(),
                is_donor: a.is_donor(),
            },
            None => AccessResponse {
                role: UserRole::default(),
                plan: UserPlan::default(),
                is_admin: false,
                has_paid_access: false,
                is_donor: false,
            },
        }
    }
}

/// GET /api/v1/me/role
pub async fn handle_get_my_role(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<RoleResponse>, AppError> {
    let role = super::get_role(&state.db, &auth.user.id).await?;
    Ok(Json(RoleResponse { role }))
}

/// GET /api/v1/me/plan
pub async fn handle_get_my_plan(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PlanResponse>, AppError> {
    let plan = super::get_plan(&state.db, &auth.user.id).await?;
    Ok(Json(PlanResponse { plan }))
}

/// GET /api/v1/me/access
pub async fn handle_get_my_access(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<AccessResponse>, AppError> {
    let access = get_access(&state.db, &auth.user.id).await?;
    Ok(Json(AccessResponse::from_access(access)))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// PUT /api/v1/admin/users/:user_id/role
pub async fn handle_update_user_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let input = UpdateUserRoleInput {
        user_id,
        role: req.role,
    };
    let profile = update_user_role(&state.db, &auth.user.id, &input).await?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Access;

    #[test]
    fn test_missing_profile_has_no_access() {
        let response = AccessResponse::from_access(None);
        assert_eq!(response.role, UserRole::User);
        assert_eq!(response.plan, UserPlan::Free);
        assert!(!response.has_paid_access && !response.is_donor && !response.is_admin);
    }

    #[test]
    fn test_access_flags_serialized() {
        let response = AccessResponse::from_access(Some(Access {
            role: UserRole::User,
            plan: UserPlan::Pro,
            total_donations: 0,
        }));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["plan"], "pro");
        assert_eq!(json["has_paid_access"], true);
        assert_eq!(json["is_donor"], false);
    }
}
