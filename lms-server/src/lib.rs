//! lms-server library - multi-tenant learning management backend
//!
//! One control database (users, tenants, memberships, sessions) plus one
//! database per tenant (courses, modules, progress, notifications).

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::{DateTime, Utc};
use lms_common::config::RootLayout;
use lms_common::events::EventBus;
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;
pub mod tenancy;

use services::TenantProvisioner;
use tenancy::TenantPools;

/// Default EventBus capacity
pub const EVENT_BUS_CAPACITY: usize = 1000;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Control database pool
    pub db: SqlitePool,
    /// Open tenant database pools
    pub tenants: TenantPools,
    pub provisioner: TenantProvisioner,
    pub event_bus: EventBus,
    /// Lifetime of newly issued sessions
    pub token_ttl_hours: i64,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, layout: RootLayout, event_bus: EventBus, token_ttl_hours: i64) -> Self {
        let tenants = TenantPools::new(layout);
        let provisioner = TenantProvisioner::new(db.clone(), tenants.clone(), event_bus.clone());
        Self {
            db,
            tenants,
            provisioner,
            event_bus,
            token_ttl_hours,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Three route groups:
/// - public: health, build info, register, login
/// - authenticated: session and profile, tenant list/create
/// - tenant-scoped: everything under `/api/tenants/:slug`, which additionally
///   requires membership of that tenant
pub fn build_router(state: AppState) -> Router {
    use api::{analytics, auth, courses, modules, notifications, progress, tenants, users};

    let tenant_scoped = Router::new()
        .route(
            "/api/tenants/:slug",
            get(tenants::get_tenant)
                .put(tenants::rename_tenant)
                .delete(tenants::delete_tenant),
        )
        .route(
            "/api/tenants/:slug/members",
            get(tenants::list_members).post(tenants::add_member),
        )
        .route(
            "/api/tenants/:slug/members/:user_id",
            put(tenants::change_role).delete(tenants::remove_member),
        )
        // Courses
        .route(
            "/api/tenants/:slug/courses",
            get(courses::list_courses).post(courses::create_course),
        )
        .route(
            "/api/tenants/:slug/courses/:course_id",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route(
            "/api/tenants/:slug/courses/:course_id/publish",
            post(courses::publish_course),
        )
        .route(
            "/api/tenants/:slug/courses/:course_id/unpublish",
            post(courses::unpublish_course),
        )
        // Modules
        .route(
            "/api/tenants/:slug/courses/:course_id/modules",
            get(modules::list_modules).post(modules::create_module),
        )
        .route(
            "/api/tenants/:slug/courses/:course_id/modules/order",
            put(modules::reorder_modules),
        )
        .route(
            "/api/tenants/:slug/courses/:course_id/modules/:module_id",
            get(modules::get_module)
                .put(modules::update_module)
                .delete(modules::delete_module),
        )
        // Enrollment and progress
        .route(
            "/api/tenants/:slug/courses/:course_id/enroll",
            post(progress::enroll),
        )
        .route(
            "/api/tenants/:slug/courses/:course_id/progress",
            get(progress::course_progress),
        )
        .route(
            "/api/tenants/:slug/courses/:course_id/modules/:module_id/complete",
            post(progress::complete_module).delete(progress::uncomplete_module),
        )
        .route("/api/tenants/:slug/enrollments", get(progress::my_enrollments))
        .route("/api/tenants/:slug/progress", get(progress::my_progress))
        // Notifications
        .route(
            "/api/tenants/:slug/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route(
            "/api/tenants/:slug/notifications/unread-count",
            get(notifications::unread_count),
        )
        .route(
            "/api/tenants/:slug/notifications/read-all",
            post(notifications::mark_all_read),
        )
        .route(
            "/api/tenants/:slug/notifications/events",
            get(notifications::notification_events),
        )
        .route(
            "/api/tenants/:slug/notifications/:notification_id",
            delete(notifications::delete_notification),
        )
        .route(
            "/api/tenants/:slug/notifications/:notification_id/read",
            post(notifications::mark_read),
        )
        .route(
            "/api/tenants/:slug/push-subscriptions",
            get(notifications::list_subscriptions).post(notifications::subscribe),
        )
        .route(
            "/api/tenants/:slug/push-subscriptions/:subscription_id",
            delete(notifications::unsubscribe),
        )
        // Analytics
        .route("/api/tenants/:slug/analytics/overview", get(analytics::overview))
        .route(
            "/api/tenants/:slug/analytics/courses/:course_id",
            get(analytics::course),
        )
        .route(
            "/api/tenants/:slug/analytics/learners/:user_id",
            get(analytics::learner),
        )
        // Last layer added runs first: authenticate, then scope to the tenant
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::tenant_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let authenticated = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/users/me", put(users::update_me))
        .route("/api/users/me/tenants", get(users::my_tenants))
        .route(
            "/api/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    Router::new()
        .merge(tenant_scoped)
        .merge(authenticated)
        .merge(public)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
