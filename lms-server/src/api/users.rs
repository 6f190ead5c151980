//! Profile endpoints for the authenticated user

use axum::{extract::State, Extension, Json};
use lms_common::auth::{validate_password, verify_password};
use serde::Deserialize;
use tracing::info;

use super::auth::AuthUser;
use crate::db::memberships::{self, UserTenant};
use crate::db::users::{self, User};
use crate::db::sessions;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub password: Option<String>,
    /// Required when `password` is set
    pub current_password: Option<String>,
}

/// PUT /api/users/me
///
/// Changing the password revokes every session of the user, including the
/// one used for this request.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let full_name = match req.full_name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::BadRequest("Full name cannot be empty".to_string())),
        other => other,
    };

    if let Some(password) = req.password.as_deref() {
        validate_password(password)?;

        let current = req.current_password.as_deref().ok_or_else(|| {
            ApiError::BadRequest("current_password is required to change password".to_string())
        })?;
        let credentials = users::find_credentials(&state.db, &auth.email)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User {}", auth.id)))?;
        if !verify_password(current, &credentials.password_salt, &credentials.password_hash) {
            return Err(ApiError::Unauthorized("Current password is incorrect".to_string()));
        }
    }

    let user = users::update_user(&state.db, auth.id, full_name, req.password.as_deref()).await?;

    if req.password.is_some() {
        let revoked = sessions::delete_user_sessions(&state.db, auth.id).await?;
        info!("Password changed for {}, revoked {} sessions", auth.id, revoked);
    }

    Ok(Json(user))
}

/// GET /api/users/me/tenants
pub async fn my_tenants(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<UserTenant>>> {
    let tenants = memberships::list_user_tenants(&state.db, auth.id).await?;
    Ok(Json(tenants))
}
