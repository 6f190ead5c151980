//! Notification, live event stream and push subscription endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use lms_common::events::LmsEvent;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::db::memberships;
use crate::db::notifications::{self, Notification, NotificationKind, PushSubscription};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{default_page, default_page_size, Page};
use crate::tenancy::{Role, TenantContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationPath {
    pub notification_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

/// GET /api/tenants/:slug/notifications
pub async fn list_notifications(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListNotificationsQuery>,
) -> ApiResult<Json<Page<Notification>>> {
    let page = notifications::list_notifications(
        &ctx.pool,
        auth.id,
        query.unread_only,
        query.page,
        query.page_size,
    )
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub kind: NotificationKind,
}

/// POST /api/tenants/:slug/notifications
///
/// Instructors and admins notify any member of the tenant.
pub async fn create_notification(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateNotificationRequest>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    ctx.require(Role::Instructor)?;

    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Notification title cannot be empty".to_string()));
    }
    if memberships::get_role(&state.db, ctx.tenant.id, req.user_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!(
            "User {} is not a member of {}",
            req.user_id,
            ctx.slug()
        )));
    }

    let notification =
        notifications::insert_notification(&ctx.pool, req.user_id, title, &req.body, req.kind)
            .await?;

    state.event_bus.emit_lossy(LmsEvent::NotificationCreated {
        tenant_slug: ctx.slug().to_string(),
        user_id: notification.user_id,
        notification_id: notification.id,
        title: notification.title.clone(),
        kind: notification.kind.to_string(),
        timestamp: Utc::now(),
    });
    info!("Notification {} sent to {} in {}", notification.id, req.user_id, ctx.slug());

    Ok((StatusCode::CREATED, Json(notification)))
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

/// GET /api/tenants/:slug/notifications/unread-count
pub async fn unread_count(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UnreadCount>> {
    let unread = notifications::unread_count(&ctx.pool, auth.id).await?;
    Ok(Json(UnreadCount { unread }))
}

/// POST /api/tenants/:slug/notifications/:notification_id/read
pub async fn mark_read(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<NotificationPath>,
) -> ApiResult<Json<Notification>> {
    let notification = notifications::mark_read(&ctx.pool, auth.id, path.notification_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Notification {}", path.notification_id)))?;
    Ok(Json(notification))
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub marked: u64,
}

/// POST /api/tenants/:slug/notifications/read-all
pub async fn mark_all_read(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let marked = notifications::mark_all_read(&ctx.pool, auth.id).await?;
    Ok(Json(MarkAllReadResponse { marked }))
}

/// DELETE /api/tenants/:slug/notifications/:notification_id
pub async fn delete_notification(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<NotificationPath>,
) -> ApiResult<StatusCode> {
    if !notifications::delete_notification(&ctx.pool, auth.id, path.notification_id).await? {
        return Err(ApiError::NotFound(format!("Notification {}", path.notification_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tenants/:slug/notifications/events
///
/// SSE stream of events addressed to the caller within this tenant:
/// `NotificationCreated` and `CourseCompleted`.
pub async fn notification_events(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
) -> impl IntoResponse {
    let slug = ctx.slug().to_string();
    let user_id = auth.id;

    lms_common::sse::filtered_event_stream("notifications", state.event_bus.subscribe(), move |event| {
        matches!(
            event,
            LmsEvent::NotificationCreated { .. } | LmsEvent::CourseCompleted { .. }
        ) && event.tenant_slug() == slug
            && event.user_id() == Some(user_id)
    })
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionPath {
    pub subscription_id: Uuid,
}

fn validate_subscription(req: &SubscribeRequest) -> ApiResult<()> {
    if !req.endpoint.starts_with("https://") || req.endpoint.len() <= "https://".len() {
        return Err(ApiError::BadRequest(
            "Push endpoint must be an https:// URL".to_string(),
        ));
    }
    if req.p256dh.trim().is_empty() || req.auth.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Push subscription keys cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/tenants/:slug/push-subscriptions
pub async fn subscribe(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<(StatusCode, Json<PushSubscription>)> {
    validate_subscription(&req)?;
    let subscription =
        notifications::upsert_subscription(&ctx.pool, auth.id, &req.endpoint, &req.p256dh, &req.auth)
            .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /api/tenants/:slug/push-subscriptions
pub async fn list_subscriptions(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<PushSubscription>>> {
    Ok(Json(notifications::list_subscriptions(&ctx.pool, auth.id).await?))
}

/// DELETE /api/tenants/:slug/push-subscriptions/:subscription_id
pub async fn unsubscribe(
    Extension(ctx): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(path): Path<SubscriptionPath>,
) -> ApiResult<StatusCode> {
    if !notifications::delete_subscription(&ctx.pool, auth.id, path.subscription_id).await? {
        return Err(ApiError::NotFound(format!(
            "Push subscription {}",
            path.subscription_id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
