//! Course endpoints
//!
//! Learners only ever see published courses. Instructors manage the courses
//! they teach; admins manage all of them.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::db::courses::{self, Course};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{default_page, default_page_size, Page};
use crate::tenancy::{Role, TenantContext};

pub const TITLE_MAX_LEN: usize = 200;

/// `:course_id` path segment (the tenant slug is consumed by middleware)
#[derive(Debug, Deserialize)]
pub struct CoursePath {
    pub course_id: Uuid,
}

pub(crate) fn validate_title(title: &str) -> ApiResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("Title cannot be empty".to_string()));
    }
    if trimmed.chars().count() > TITLE_MAX_LEN {
        return Err(ApiError::BadRequest(format!(
            "Title exceeds {} characters",
            TITLE_MAX_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Load a course visible to the caller (unpublished courses are 404 for learners)
pub(crate) async fn visible_course(ctx: &TenantContext, course_id: Uuid) -> ApiResult<Course> {
    let course = courses::get_course(&ctx.pool, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Course {}", course_id)))?;

    if !course.published && !ctx.is_at_least(Role::Instructor) {
        return Err(ApiError::NotFound(format!("Course {}", course_id)));
    }
    Ok(course)
}

/// Load a course the caller may modify
pub(crate) async fn managed_course(
    ctx: &TenantContext,
    auth: &AuthUser,
    course_id: Uuid,
) -> ApiResult<Course> {
    ctx.require(Role::Instructor)?;
    let course = visible_course(ctx, course_id).await?;

    if !ctx.is_at_least(Role::Admin) && course.instructor_id != auth.id {
        return Err(ApiError::Forbidden(
            "Only the course instructor or an admin may modify this course".to_string(),
        ));
    }
    Ok(course)
}

#[derive(Debug, Deserialize)]
pub struct ListCoursesQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Only honored for instructors and admins; learners always get published only
    #[serde(default)]
    pub published: Option<bool>,
}

/// GET /api/tenants/:slug/courses
pub async fn list_courses(
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ListCoursesQuery>,
) -> ApiResult<Json<Page<Course>>> {
    let published_only = if ctx.is_at_least(Role::Instructor) {
        query.published.unwrap_or(false)
    } else {
        true
    };
    let page = courses::list_courses(&ctx.pool, published_only, query.page, query.page_size).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/tenants/:slug/courses
pub async fn create_course(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateCourseRequest>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    ctx.require(Role::Instructor)?;
    let title = validate_title(&req.title)?;

    let course = Course::new(title, req.description, auth.id);
    courses::insert_course(&ctx.pool, &course).await?;
    info!("Course {} created in {}", course.id, ctx.slug());

    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/tenants/:slug/courses/:course_id
pub async fn get_course(
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<CoursePath>,
) -> ApiResult<Json<Course>> {
    Ok(Json(visible_course(&ctx, path.course_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// PUT /api/tenants/:slug/courses/:course_id
pub async fn update_course(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
    Json(req): Json<UpdateCourseRequest>,
) -> ApiResult<Json<Course>> {
    managed_course(&ctx, &auth, path.course_id).await?;
    let title = req.title.as_deref().map(validate_title).transpose()?;

    let course = courses::update_course(
        &ctx.pool,
        path.course_id,
        title.as_deref(),
        req.description.as_deref(),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Course {}", path.course_id)))?;
    Ok(Json(course))
}

/// DELETE /api/tenants/:slug/courses/:course_id
pub async fn delete_course(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
) -> ApiResult<StatusCode> {
    managed_course(&ctx, &auth, path.course_id).await?;
    courses::delete_course(&ctx.pool, path.course_id).await?;
    info!("Course {} deleted from {}", path.course_id, ctx.slug());
    Ok(StatusCode::NO_CONTENT)
}

async fn set_published(
    ctx: &TenantContext,
    auth: &AuthUser,
    course_id: Uuid,
    published: bool,
) -> ApiResult<Json<Course>> {
    managed_course(ctx, auth, course_id).await?;
    let course = courses::set_published(&ctx.pool, course_id, published)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Course {}", course_id)))?;
    info!(
        "Course {} {} in {}",
        course_id,
        if published { "published" } else { "unpublished" },
        ctx.slug()
    );
    Ok(Json(course))
}

/// POST /api/tenants/:slug/courses/:course_id/publish
pub async fn publish_course(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
) -> ApiResult<Json<Course>> {
    set_published(&ctx, &auth, path.course_id, true).await
}

/// POST /api/tenants/:slug/courses/:course_id/unpublish
pub async fn unpublish_course(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<CoursePath>,
) -> ApiResult<Json<Course>> {
    set_published(&ctx, &auth, path.course_id, false).await
}
