//! Course module endpoints

use axum::{
    extract::Path,
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use super::auth::AuthUser;
use super::courses::{managed_course, validate_title, visible_course, CoursePath};
use crate::db::modules::{self, Module};
use crate::error::{ApiError, ApiResult};
use crate::tenancy::TenantContext;

#[derive(Debug, Deserialize)]
pub struct ModulePath {
    pub course_id: Uuid,
    pub module_id: Uuid,
}

fn validate_duration(minutes: Option<i64>) -> ApiResult<Option<i64>> {
    match minutes {
        Some(m) if m < 0 => Err(ApiError::BadRequest(
            "duration_minutes cannot be negative".to_string(),
        )),
        other => Ok(other),
    }
}

/// GET /api/tenants/:slug/courses/:course_id/modules
pub async fn list_modules(
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<CoursePath>,
) -> ApiResult<Json<Vec<Module>>> {
    visible_course(&ctx, path.course_id).await?;
    Ok(Json(modules::list_modules(&ctx.pool, path.course_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateModuleRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub duration_minutes: Option<i64>,
}

/// POST /api/tenants/:slug/courses/:course_id/modules
pub async fn create_module(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
    Json(req): Json<CreateModuleRequest>,
) -> ApiResult<(StatusCode, Json<Module>)> {
    managed_course(&ctx, &auth, path.course_id).await?;
    let title = validate_title(&req.title)?;
    let duration = validate_duration(req.duration_minutes)?;

    let module = modules::insert_module(&ctx.pool, path.course_id, &title, &req.content, duration).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

/// GET /api/tenants/:slug/courses/:course_id/modules/:module_id
pub async fn get_module(
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<ModulePath>,
) -> ApiResult<Json<Module>> {
    visible_course(&ctx, path.course_id).await?;
    let module = modules::get_module(&ctx.pool, path.course_id, path.module_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Module {}", path.module_id)))?;
    Ok(Json(module))
}

/// Distinguishes an absent field from an explicit `null`
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct UpdateModuleRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `null` clears the duration, absence keeps it
    #[serde(default, deserialize_with = "double_option")]
    pub duration_minutes: Option<Option<i64>>,
}

/// PUT /api/tenants/:slug/courses/:course_id/modules/:module_id
pub async fn update_module(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<ModulePath>,
    Json(req): Json<UpdateModuleRequest>,
) -> ApiResult<Json<Module>> {
    managed_course(&ctx, &auth, path.course_id).await?;
    let title = req.title.as_deref().map(validate_title).transpose()?;
    let duration = req.duration_minutes.map(validate_duration).transpose()?;

    let module = modules::update_module(
        &ctx.pool,
        path.course_id,
        path.module_id,
        title.as_deref(),
        req.content.as_deref(),
        duration,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Module {}", path.module_id)))?;
    Ok(Json(module))
}

/// DELETE /api/tenants/:slug/courses/:course_id/modules/:module_id
pub async fn delete_module(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<ModulePath>,
) -> ApiResult<StatusCode> {
    managed_course(&ctx, &auth, path.course_id).await?;
    if !modules::delete_module(&ctx.pool, path.course_id, path.module_id).await? {
        return Err(ApiError::NotFound(format!("Module {}", path.module_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub module_ids: Vec<Uuid>,
}

/// PUT /api/tenants/:slug/courses/:course_id/modules/order
pub async fn reorder_modules(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<Json<Vec<Module>>> {
    managed_course(&ctx, &auth, path.course_id).await?;
    let ordered = modules::reorder_modules(&ctx.pool, path.course_id, &req.module_ids).await?;
    Ok(Json(ordered))
}
