//! Authentication: registration, login sessions and the bearer-token middleware
//!
//! Clients send `Authorization: Bearer <token>`. The token is hashed and
//! looked up in the `sessions` table; the raw value is never stored or logged.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use lms_common::auth::{hash_token, normalize_email, validate_email, validate_password, verify_password};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{sessions, users};
use crate::db::users::User;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Control setting that gates self-registration
pub const REGISTRATION_OPEN_SETTING: &str = "registration_open";

/// Same message for unknown email and wrong password
const BAD_CREDENTIALS: &str = "Invalid email or password";

/// Authenticated caller, inserted into request extensions by `auth_middleware`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    /// Hash of the presented token, used by logout
    pub token_hash: String,
}

fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Authentication middleware
///
/// Resolves the bearer token to a user or rejects the request with 401.
/// Expired sessions are deleted when seen.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;
    let token_hash = hash_token(token);

    let user = sessions::find_session_user(&state.db, &token_hash)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

    debug!("Authenticated {}", user.email);
    request.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
        token_hash,
    });

    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let open = lms_common::db::get_setting(&state.db, REGISTRATION_OPEN_SETTING)
        .await?
        .map(|v| v != "false")
        .unwrap_or(true);
    if !open {
        return Err(ApiError::Forbidden("Registration is closed".to_string()));
    }

    let email = normalize_email(&req.email);
    validate_email(&email)?;
    validate_password(&req.password)?;
    let full_name = req.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::BadRequest("Full name cannot be empty".to_string()));
    }

    let user = users::insert_user(&state.db, &email, &req.password, full_name)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ApiError::Conflict(format!("Email {} is already registered", email))
            } else {
                e.into()
            }
        })?;

    info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = normalize_email(&req.email);
    let credentials = users::find_credentials(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

    if !verify_password(&req.password, &credentials.password_salt, &credentials.password_hash) {
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    let session =
        sessions::create_session(&state.db, credentials.user.id, state.token_ttl_hours).await?;
    info!("User {} logged in", credentials.user.id);

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user: credentials.user,
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<StatusCode> {
    sessions::delete_session(&state.db, &auth.token_hash).await?;
    info!("User {} logged out", auth.id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let user = users::get_user(&state.db, auth.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {}", auth.id)))?;
    Ok(Json(user))
}
