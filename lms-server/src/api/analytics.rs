//! Analytics endpoints (instructors and admins; learners may read their own summary)

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::courses::{visible_course, CoursePath};
use crate::error::{ApiError, ApiResult};
use crate::services::analytics::{self, CourseAnalytics, LearnerSummary, TenantOverview};
use crate::tenancy::{Role, TenantContext};
use crate::AppState;

/// GET /api/tenants/:slug/analytics/overview
pub async fn overview(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<TenantOverview>> {
    ctx.require(Role::Instructor)?;
    let overview = analytics::tenant_overview(&state.db, &ctx.pool, ctx.tenant.id).await?;
    Ok(Json(overview))
}

/// GET /api/tenants/:slug/analytics/courses/:course_id
pub async fn course(
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<CoursePath>,
) -> ApiResult<Json<CourseAnalytics>> {
    ctx.require(Role::Instructor)?;
    let course = visible_course(&ctx, path.course_id).await?;
    Ok(Json(analytics::course_analytics(&ctx.pool, &course).await?))
}

#[derive(Debug, Deserialize)]
pub struct LearnerPath {
    pub user_id: Uuid,
}

/// GET /api/tenants/:slug/analytics/learners/:user_id
pub async fn learner(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<LearnerPath>,
) -> ApiResult<Json<LearnerSummary>> {
    if path.user_id != auth.id && !ctx.is_at_least(Role::Instructor) {
        return Err(ApiError::Forbidden(
            "Learners may only view their own summary".to_string(),
        ));
    }
    Ok(Json(analytics::learner_summary(&ctx.pool, path.user_id).await?))
}
