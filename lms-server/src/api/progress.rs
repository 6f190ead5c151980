//! Enrollment and progress endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use lms_common::events::LmsEvent;
use serde::Deserialize;
use tracing::info;

use super::auth::AuthUser;
use super::courses::{visible_course, CoursePath};
use super::modules::ModulePath;
use crate::db::modules;
use crate::db::progress::{self, Enrollment};
use crate::error::{ApiError, ApiResult};
use crate::services::analytics::{self, CourseProgress};
use crate::tenancy::TenantContext;
use crate::AppState;

/// POST /api/tenants/:slug/courses/:course_id/enroll
///
/// Only published courses accept enrollments. Enrolling twice is a no-op.
pub async fn enroll(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
) -> ApiResult<(StatusCode, Json<Enrollment>)> {
    let course = visible_course(&ctx, path.course_id).await?;
    if !course.published {
        return Err(ApiError::BadRequest(
            "Cannot enroll in an unpublished course".to_string(),
        ));
    }

    let enrollment = progress::enroll(&ctx.pool, course.id, auth.id).await?;
    info!("{} enrolled in {} ({})", auth.id, course.id, ctx.slug());
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// GET /api/tenants/:slug/enrollments
pub async fn my_enrollments(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Enrollment>>> {
    Ok(Json(progress::list_user_enrollments(&ctx.pool, auth.id).await?))
}

/// GET /api/tenants/:slug/courses/:course_id/progress
pub async fn course_progress(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
) -> ApiResult<Json<CourseProgress>> {
    visible_course(&ctx, path.course_id).await?;
    let progress = analytics::learner_course_progress(&ctx.pool, path.course_id, auth.id).await?;
    Ok(Json(progress))
}

/// GET /api/tenants/:slug/progress
pub async fn my_progress(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<CourseProgress>>> {
    Ok(Json(analytics::learner_progress(&ctx.pool, auth.id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteModuleRequest {
    pub score: Option<f64>,
}

async fn require_enrolled_module(
    ctx: &TenantContext,
    auth: &AuthUser,
    path: &ModulePath,
) -> ApiResult<()> {
    visible_course(ctx, path.course_id).await?;
    if !progress::is_enrolled(&ctx.pool, path.course_id, auth.id).await? {
        return Err(ApiError::Forbidden("Not enrolled in this course".to_string()));
    }
    modules::get_module(&ctx.pool, path.course_id, path.module_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Module {}", path.module_id)))?;
    Ok(())
}

/// Parse an optional JSON body; an empty body means no score
fn parse_complete_request(body: &[u8]) -> ApiResult<CompleteModuleRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CompleteModuleRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid completion body: {}", e)))
}

/// POST /api/tenants/:slug/courses/:course_id/modules/:module_id/complete
///
/// Emits `CourseCompleted` when this completion finishes the course.
/// The before/after progress reads are not atomic with the upsert, so two
/// concurrent completions of a course's last modules may both emit it.
/// Subscribers must treat the event as at-least-once.
pub async fn complete_module(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<ModulePath>,
    body: Bytes,
) -> ApiResult<Json<CourseProgress>> {
    let req = parse_complete_request(&body)?;
    require_enrolled_module(&ctx, &auth, &path).await?;

    let before = analytics::learner_course_progress(&ctx.pool, path.course_id, auth.id).await?;
    progress::complete_module(&ctx.pool, auth.id, path.course_id, path.module_id, req.score).await?;
    let after = analytics::learner_course_progress(&ctx.pool, path.course_id, auth.id).await?;

    if after.completed && !before.completed {
        info!("{} completed course {} ({})", auth.id, path.course_id, ctx.slug());
        state.event_bus.emit_lossy(LmsEvent::CourseCompleted {
            tenant_slug: ctx.slug().to_string(),
            user_id: auth.id,
            course_id: path.course_id,
            timestamp: Utc::now(),
        });
    }

    Ok(Json(after))
}

/// DELETE /api/tenants/:slug/courses/:course_id/modules/:module_id/complete
pub async fn uncomplete_module(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<ModulePath>,
) -> ApiResult<Json<CourseProgress>> {
    require_enrolled_module(&ctx, &auth, &path).await?;
    progress::uncomplete_module(&ctx.pool, auth.id, path.module_id).await?;
    let after = analytics::learner_course_progress(&ctx.pool, path.course_id, auth.id).await?;
    Ok(Json(after))
}
