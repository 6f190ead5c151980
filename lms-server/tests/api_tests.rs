//! Integration tests for lms-server API endpoints
//!
//! Every test builds the full router over a fresh root folder in a TempDir
//! and drives it with `oneshot`.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use lms_common::config::RootLayout;
use lms_common::events::{EventBus, LmsEvent};
use lms_server::{build_router, AppState};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method
use uuid::Uuid;

struct TestApp {
    app: Router,
    state: AppState,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = TempDir::new().expect("Should create temp dir");
        let layout = RootLayout::new(dir.path());
        layout.ensure_directories().unwrap();
        let db = lms_common::db::init_control_database(&layout.control_db_path())
            .await
            .expect("Should init control database");

        let state = AppState::new(db, layout, EventBus::new(64), 24);
        let app = build_router(state.clone());
        Self {
            app,
            state,
            _dir: dir,
        }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Should parse JSON")
        };
        (status, json)
    }

    /// Register and log in, returning (token, user_id)
    async fn signup(&self, email: &str, name: &str) -> (String, String) {
        let (status, _) = self
            .request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"email": email, "password": "password123", "full_name": name})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": email, "password": "password123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    async fn create_tenant(&self, token: &str, slug: &str) {
        let (status, body) = self
            .request(
                "POST",
                "/api/tenants",
                Some(token),
                Some(json!({"slug": slug, "name": "Test Tenant"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create tenant failed: {}", body);
    }

    async fn add_member(&self, admin_token: &str, slug: &str, email: &str, role: &str) {
        let (status, body) = self
            .request(
                "POST",
                &format!("/api/tenants/{}/members", slug),
                Some(admin_token),
                Some(json!({"email": email, "role": role})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "add member failed: {}", body);
    }
}

// =============================================================================
// Health and build info
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = TestApp::new().await;

    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "lms-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo() {
    let app = TestApp::new().await;
    let (status, body) = app.request("GET", "/api/buildinfo", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["git_hash"].is_string());
}

// =============================================================================
// Registration, login and sessions
// =============================================================================

#[tokio::test]
async fn test_register_login_me_logout() {
    let app = TestApp::new().await;
    let (token, user_id) = app.signup("Ada@Example.com", "Ada Lovelace").await;

    let (status, body) = app.request("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user_id.as_str());
    assert_eq!(body["email"], "ada@example.com");
    assert!(body.get("password_hash").is_none());

    let (status, _) = app.request("POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new().await;
    app.signup("ada@example.com", "Ada").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "ADA@example.com", "password": "password123", "full_name": "Ada"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_registration_validation() {
    let app = TestApp::new().await;

    let cases = [
        json!({"email": "not-an-email", "password": "password123", "full_name": "X"}),
        json!({"email": "x@example.com", "password": "short", "full_name": "X"}),
        json!({"email": "x@example.com", "password": "password123", "full_name": "  "}),
    ];
    for body in cases {
        let (status, _) = app.request("POST", "/api/auth/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_bad_credentials_share_one_message() {
    let app = TestApp::new().await;
    app.signup("ada@example.com", "Ada").await;

    let (status, wrong_password) = app
        .request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_email) = app
        .request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "nobody@example.com", "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn test_missing_or_garbage_token_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.request("GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.request("GET", "/api/tenants", Some("deadbeef"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_can_be_closed() {
    let app = TestApp::new().await;
    lms_common::db::set_setting(&app.state.db, "registration_open", "false")
        .await
        .unwrap();

    let (status, _) = app
        .request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "ada@example.com", "password": "password123", "full_name": "Ada"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_password_change_revokes_sessions() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("ada@example.com", "Ada").await;

    let (status, _) = app
        .request(
            "PUT",
            "/api/users/me",
            Some(&token),
            Some(json!({"password": "new-password-1", "current_password": "wrong-one"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            "PUT",
            "/api/users/me",
            Some(&token),
            Some(json!({
                "full_name": "Countess",
                "password": "new-password-1",
                "current_password": "password123"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["full_name"], "Countess");

    let (status, _) = app.request("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "new-password-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Tenants and membership
// =============================================================================

#[tokio::test]
async fn test_create_tenant_provisions_database() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("ada@example.com", "Ada").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/tenants",
            Some(&token),
            Some(json!({"slug": "acme-corp", "name": "  Acme Corp  "})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "acme-corp");
    assert_eq!(body["name"], "Acme Corp");
    assert_eq!(body["status"], "active");
    assert_eq!(body["role"], "admin");
    assert_eq!(body["database_name"], "tenant_acme_corp");

    assert!(app
        .state
        .tenants
        .layout()
        .tenant_db_path("tenant_acme_corp")
        .exists());

    let (status, body) = app.request("GET", "/api/tenants", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["items"][0]["slug"], "acme-corp");

    let (status, body) = app.request("GET", "/api/users/me/tenants", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["role"], "admin");
}

#[tokio::test]
async fn test_create_tenant_rejects_bad_or_taken_slug() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("ada@example.com", "Ada").await;
    app.create_tenant(&token, "acme").await;

    let (status, _) = app
        .request(
            "POST",
            "/api/tenants",
            Some(&token),
            Some(json!({"slug": "acme", "name": "Again"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for slug in ["ab", "Acme", "-acme", "ac--me", "acme_corp"] {
        let (status, _) = app
            .request(
                "POST",
                "/api/tenants",
                Some(&token),
                Some(json!({"slug": slug, "name": "Bad"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "slug {} should be rejected", slug);
    }
}

#[tokio::test]
async fn test_tenant_access_requires_membership() {
    let app = TestApp::new().await;
    let (ada, _) = app.signup("ada@example.com", "Ada").await;
    let (eve, _) = app.signup("eve@example.com", "Eve").await;
    app.create_tenant(&ada, "acme").await;

    let (status, _) = app.request("GET", "/api/tenants/acme", Some(&eve), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.request("GET", "/api/tenants/acme/courses", Some(&eve), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.request("GET", "/api/tenants/nowhere", Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.request("GET", "/api/tenants/acme", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_member_management_keeps_an_admin() {
    let app = TestApp::new().await;
    let (ada, ada_id) = app.signup("ada@example.com", "Ada").await;
    let (bob, bob_id) = app.signup("bob@example.com", "Bob").await;
    app.create_tenant(&ada, "acme").await;

    app.add_member(&ada, "acme", "bob@example.com", "learner").await;

    // Already a member
    let (status, _) = app
        .request(
            "POST",
            "/api/tenants/acme/members",
            Some(&ada),
            Some(json!({"email": "bob@example.com", "role": "instructor"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Unknown user
    let (status, _) = app
        .request(
            "POST",
            "/api/tenants/acme/members",
            Some(&ada),
            Some(json!({"email": "ghost@example.com", "role": "learner"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Learners cannot manage members
    let (status, _) = app
        .request(
            "PUT",
            &format!("/api/tenants/acme/members/{}", ada_id),
            Some(&bob),
            Some(json!({"role": "learner"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The only admin can neither be demoted nor removed
    let (status, _) = app
        .request(
            "PUT",
            &format!("/api/tenants/acme/members/{}", ada_id),
            Some(&ada),
            Some(json!({"role": "instructor"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/tenants/acme/members/{}", ada_id),
            Some(&ada),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // With a second admin the first may step down
    let (status, body) = app
        .request(
            "PUT",
            &format!("/api/tenants/acme/members/{}", bob_id),
            Some(&ada),
            Some(json!({"role": "admin"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    let (status, _) = app
        .request(
            "PUT",
            &format!("/api/tenants/acme/members/{}", ada_id),
            Some(&ada),
            Some(json!({"role": "learner"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.request("GET", "/api/tenants/acme/members", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_rename_and_delete_tenant() {
    let app = TestApp::new().await;
    let (ada, _) = app.signup("ada@example.com", "Ada").await;
    let (bob, _) = app.signup("bob@example.com", "Bob").await;
    app.create_tenant(&ada, "acme").await;
    app.add_member(&ada, "acme", "bob@example.com", "instructor").await;

    let (status, _) = app
        .request("PUT", "/api/tenants/acme", Some(&bob), Some(json!({"name": "Nope"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request("PUT", "/api/tenants/acme", Some(&ada), Some(json!({"name": "Acme Inc"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Acme Inc");

    let mut rx = app.state.event_bus.subscribe();
    let (status, _) = app.request("DELETE", "/api/tenants/acme", Some(&ada), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(matches!(rx.try_recv(), Ok(LmsEvent::TenantDeleted { .. })));
    assert!(!app.state.tenants.layout().tenant_db_path("tenant_acme").exists());

    let (status, _) = app.request("GET", "/api/tenants/acme", Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Slug is free again
    app.create_tenant(&ada, "acme").await;
}

// =============================================================================
// Courses, modules and progress
// =============================================================================

/// Tenant "acme" with an admin, an instructor and a learner
async fn classroom(app: &TestApp) -> (String, String, String) {
    let (admin, _) = app.signup("admin@example.com", "Admin").await;
    let (instructor, _) = app.signup("instructor@example.com", "Instructor").await;
    let (learner, _) = app.signup("learner@example.com", "Learner").await;
    app.create_tenant(&admin, "acme").await;
    app.add_member(&admin, "acme", "instructor@example.com", "instructor").await;
    app.add_member(&admin, "acme", "learner@example.com", "learner").await;
    (admin, instructor, learner)
}

async fn create_course(app: &TestApp, token: &str, title: &str) -> String {
    let (status, body) = app
        .request(
            "POST",
            "/api/tenants/acme/courses",
            Some(token),
            Some(json!({"title": title, "description": "About"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create course failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}

async fn create_module(app: &TestApp, token: &str, course_id: &str, title: &str) -> String {
    let (status, body) = app
        .request(
            "POST",
            &format!("/api/tenants/acme/courses/{}/modules", course_id),
            Some(token),
            Some(json!({"title": title, "content": "Read this", "duration_minutes": 10})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create module failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_learners_only_see_published_courses() {
    let app = TestApp::new().await;
    let (_, instructor, learner) = classroom(&app).await;

    let (status, _) = app
        .request(
            "POST",
            "/api/tenants/acme/courses",
            Some(&learner),
            Some(json!({"title": "Mine"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let course_id = create_course(&app, &instructor, "Rust 101").await;

    let (_, body) = app.request("GET", "/api/tenants/acme/courses", Some(&learner), None).await;
    assert_eq!(body["total_items"], 0);
    let (status, _) = app
        .request("GET", &format!("/api/tenants/acme/courses/{}", course_id), Some(&learner), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/tenants/acme/courses/{}/publish", course_id),
            Some(&instructor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["published"], true);

    let (_, body) = app.request("GET", "/api/tenants/acme/courses", Some(&learner), None).await;
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["items"][0]["title"], "Rust 101");
}

#[tokio::test]
async fn test_instructors_only_modify_their_own_courses() {
    let app = TestApp::new().await;
    let (admin, instructor, _) = classroom(&app).await;
    let (other, _) = app.signup("other@example.com", "Other").await;
    app.add_member(&admin, "acme", "other@example.com", "instructor").await;

    let course_id = create_course(&app, &instructor, "Rust 101").await;
    let uri = format!("/api/tenants/acme/courses/{}", course_id);

    let (status, _) = app
        .request("PUT", &uri, Some(&other), Some(json!({"title": "Hijacked"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request("PUT", &uri, Some(&admin), Some(json!({"title": "Rust 102"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Rust 102");
    assert_eq!(body["description"], "About");

    let (status, _) = app.request("DELETE", &uri, Some(&instructor), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.request("GET", &uri, Some(&instructor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_module_ordering() {
    let app = TestApp::new().await;
    let (_, instructor, _) = classroom(&app).await;
    let course_id = create_course(&app, &instructor, "Rust 101").await;

    let a = create_module(&app, &instructor, &course_id, "A").await;
    let b = create_module(&app, &instructor, &course_id, "B").await;
    let c = create_module(&app, &instructor, &course_id, "C").await;

    let order_uri = format!("/api/tenants/acme/courses/{}/modules/order", course_id);
    let (status, body) = app
        .request("PUT", &order_uri, Some(&instructor), Some(json!({"module_ids": [c, a, b]})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["C", "A", "B"]);

    let (status, _) = app
        .request("PUT", &order_uri, Some(&instructor), Some(json!({"module_ids": [a, b]})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/tenants/acme/courses/{}/modules/{}", course_id, a),
            Some(&instructor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app
        .request(
            "GET",
            &format!("/api/tenants/acme/courses/{}/modules", course_id),
            Some(&instructor),
            None,
        )
        .await;
    let positions: Vec<(String, i64)> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| (m["title"].as_str().unwrap().to_string(), m["position"].as_i64().unwrap()))
        .collect();
    assert_eq!(positions, vec![("C".to_string(), 0), ("B".to_string(), 1)]);
}

#[tokio::test]
async fn test_learning_flow_emits_course_completed() {
    let app = TestApp::new().await;
    let (_, instructor, learner) = classroom(&app).await;
    let course_id = create_course(&app, &instructor, "Rust 101").await;
    let m1 = create_module(&app, &instructor, &course_id, "Ownership").await;
    let m2 = create_module(&app, &instructor, &course_id, "Borrowing").await;
    let course_uri = format!("/api/tenants/acme/courses/{}", course_id);

    // Drafts cannot be enrolled in (and are invisible to learners)
    let (status, _) = app
        .request("POST", &format!("{}/enroll", course_uri), Some(&learner), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.request("POST", &format!("{}/publish", course_uri), Some(&instructor), None)
        .await;

    // Completing before enrolling is forbidden
    let (status, _) = app
        .request(
            "POST",
            &format!("{}/modules/{}/complete", course_uri, m1),
            Some(&learner),
            Some(json!({"score": 90})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for _ in 0..2 {
        let (status, _) = app
            .request("POST", &format!("{}/enroll", course_uri), Some(&learner), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, body) = app.request("GET", "/api/tenants/acme/enrollments", Some(&learner), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = app
        .request(
            "POST",
            &format!("{}/modules/{}/complete", course_uri, m1),
            Some(&learner),
            Some(json!({"score": 150})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A malformed score is rejected, not treated as "no score"
    let (status, body) = app
        .request(
            "POST",
            &format!("{}/modules/{}/complete", course_uri, m1),
            Some(&learner),
            Some(json!({"score": "ninety"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    let (_, body) = app
        .request("GET", &format!("{}/progress", course_uri), Some(&learner), None)
        .await;
    assert_eq!(body["completed_modules"], 0);

    let mut rx = app.state.event_bus.subscribe();

    let (status, body) = app
        .request(
            "POST",
            &format!("{}/modules/{}/complete", course_uri, m1),
            Some(&learner),
            Some(json!({"score": 90})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["percent_complete"], 50.0);
    assert_eq!(body["completed"], false);

    let (status, body) = app
        .request(
            "POST",
            &format!("{}/modules/{}/complete", course_uri, m2),
            Some(&learner),
            Some(json!({"score": 75})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["percent_complete"], 100.0);
    assert_eq!(body["average_score"], 82.5);
    assert_eq!(body["completed"], true);

    match rx.try_recv() {
        Ok(LmsEvent::CourseCompleted { tenant_slug, course_id: id, .. }) => {
            assert_eq!(tenant_slug, "acme");
            assert_eq!(id.to_string(), course_id);
        }
        other => panic!("Expected CourseCompleted, got {:?}", other),
    }

    // Completing again (empty body, no score) does not re-announce the course
    let (status, body) = app
        .request(
            "POST",
            &format!("{}/modules/{}/complete", course_uri, m2),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], true);
    assert!(rx.try_recv().is_err());

    let (status, body) = app
        .request(
            "DELETE",
            &format!("{}/modules/{}/complete", course_uri, m2),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed_modules"], 1);

    let (_, body) = app.request("GET", "/api/tenants/acme/progress", Some(&learner), None).await;
    assert_eq!(body[0]["percent_complete"], 50.0);
}

// =============================================================================
// Notifications and push subscriptions
// =============================================================================

#[tokio::test]
async fn test_notification_lifecycle() {
    let app = TestApp::new().await;
    let (_, instructor, learner) = classroom(&app).await;
    let (_, body) = app.request("GET", "/api/auth/me", Some(&learner), None).await;
    let learner_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            "POST",
            "/api/tenants/acme/notifications",
            Some(&learner),
            Some(json!({"user_id": learner_id, "title": "Self"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut rx = app.state.event_bus.subscribe();
    let (status, body) = app
        .request(
            "POST",
            "/api/tenants/acme/notifications",
            Some(&instructor),
            Some(json!({"user_id": learner_id, "title": "Quiz tomorrow", "kind": "reminder"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["kind"], "reminder");
    let notification_id = body["id"].as_str().unwrap().to_string();
    assert!(matches!(rx.try_recv(), Ok(LmsEvent::NotificationCreated { .. })));

    let (_, body) = app
        .request("GET", "/api/tenants/acme/notifications/unread-count", Some(&learner), None)
        .await;
    assert_eq!(body["unread"], 1);

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/tenants/acme/notifications/{}/read", notification_id),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["read_at"].is_string());

    // Not visible to anyone else
    let (status, _) = app
        .request(
            "POST",
            &format!("/api/tenants/acme/notifications/{}/read", notification_id),
            Some(&instructor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .request("GET", "/api/tenants/acme/notifications?unread_only=true", Some(&learner), None)
        .await;
    assert_eq!(body["total_items"], 0);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/tenants/acme/notifications/{}", notification_id),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_notification_target_must_be_member() {
    let app = TestApp::new().await;
    let (admin, _, _) = classroom(&app).await;
    let (_, outsider_id) = app.signup("outsider@example.com", "Outsider").await;

    let (status, _) = app
        .request(
            "POST",
            "/api/tenants/acme/notifications",
            Some(&admin),
            Some(json!({"user_id": outsider_id, "title": "Hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            "POST",
            "/api/tenants/acme/notifications",
            Some(&admin),
            Some(json!({"user_id": outsider_id, "title": "Hi", "kind": "urgent"})),
        )
        .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_push_subscriptions() {
    let app = TestApp::new().await;
    let (_, _, learner) = classroom(&app).await;

    let (status, _) = app
        .request(
            "POST",
            "/api/tenants/acme/push-subscriptions",
            Some(&learner),
            Some(json!({"endpoint": "http://insecure.example.com", "p256dh": "k", "auth": "a"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            "POST",
            "/api/tenants/acme/push-subscriptions",
            Some(&learner),
            Some(json!({"endpoint": "https://push.example.com/x", "p256dh": "k", "auth": "a"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .request("GET", "/api/tenants/acme/push-subscriptions", Some(&learner), None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/tenants/acme/push-subscriptions/{}", id),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

/// Append SSE body chunks to `buf` until it contains `needle`
async fn read_sse_until<S>(stream: &mut S, buf: &mut String, needle: &str)
where
    S: Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    while !buf.contains(needle) {
        match tokio::time::timeout(Duration::from_secs(2), stream.next()).await {
            Ok(Some(Ok(chunk))) => buf.push_str(&String::from_utf8_lossy(&chunk)),
            other => panic!("SSE stream ended before {:?}: {:?} (so far: {})", needle, other.is_ok(), buf),
        }
    }
}

fn notification_event(tenant_slug: &str, user_id: Uuid) -> (Uuid, LmsEvent) {
    let notification_id = Uuid::new_v4();
    let event = LmsEvent::NotificationCreated {
        tenant_slug: tenant_slug.to_string(),
        user_id,
        notification_id,
        title: "Heads up".to_string(),
        kind: "info".to_string(),
        timestamp: Utc::now(),
    };
    (notification_id, event)
}

#[tokio::test]
async fn test_notification_stream_only_forwards_own_events() {
    let app = TestApp::new().await;
    let (_, instructor, learner) = classroom(&app).await;
    let (_, body) = app.request("GET", "/api/auth/me", Some(&learner), None).await;
    let learner_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let (_, body) = app.request("GET", "/api/auth/me", Some(&instructor), None).await;
    let instructor_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let request = Request::builder()
        .uri("/api/tenants/acme/notifications/events")
        .header(header::AUTHORIZATION, format!("Bearer {}", learner))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let mut stream = Box::pin(response.into_body().into_data_stream());

    let mut buf = String::new();
    read_sse_until(&mut stream, &mut buf, "connected").await;
    assert!(buf.contains("event: ConnectionStatus"));

    // Someone else's notification, then this learner's completion in another tenant
    let (other_id, other_user) = notification_event("acme", instructor_id);
    app.state.event_bus.emit_lossy(other_user);
    app.state.event_bus.emit_lossy(LmsEvent::CourseCompleted {
        tenant_slug: "elsewhere".to_string(),
        user_id: learner_id,
        course_id: Uuid::new_v4(),
        timestamp: Utc::now(),
    });
    let (own_id, own) = notification_event("acme", learner_id);
    app.state.event_bus.emit_lossy(own);

    read_sse_until(&mut stream, &mut buf, &own_id.to_string()).await;
    let status_at = buf.find("ConnectionStatus").unwrap();
    let event_at = buf.find("event: NotificationCreated").unwrap();
    assert!(status_at < event_at);
    assert!(!buf.contains(&other_id.to_string()));
    assert!(!buf.contains("CourseCompleted"));
    assert_eq!(buf.matches("event: NotificationCreated").count(), 1);

    // Nothing else is pending
    let next = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
    assert!(next.is_err(), "unexpected SSE frame after own event");
}

// =============================================================================
// Pagination query parsing
// =============================================================================

#[tokio::test]
async fn test_list_queries_parse_paging_and_filters() {
    let app = TestApp::new().await;
    let (_, instructor, learner) = classroom(&app).await;
    let (_, body) = app.request("GET", "/api/auth/me", Some(&learner), None).await;
    let learner_id = body["id"].as_str().unwrap().to_string();

    let draft = create_course(&app, &instructor, "Draft").await;
    let live = create_course(&app, &instructor, "Live").await;
    app.request(
        "POST",
        &format!("/api/tenants/acme/courses/{}/publish", live),
        Some(&instructor),
        None,
    )
    .await;

    let (status, body) = app
        .request(
            "GET",
            "/api/tenants/acme/courses?page=1&page_size=1&published=true",
            Some(&instructor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page_size"], 1);
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["items"][0]["id"], live.as_str());

    let (_, body) = app
        .request("GET", "/api/tenants/acme/courses?page=2&page_size=1", Some(&instructor), None)
        .await;
    assert_eq!(body["page"], 2);
    assert_eq!(body["total_items"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert!(body["items"][0]["id"] == draft.as_str() || body["items"][0]["id"] == live.as_str());

    for title in ["One", "Two", "Three"] {
        app.request(
            "POST",
            "/api/tenants/acme/notifications",
            Some(&instructor),
            Some(json!({"user_id": learner_id, "title": title})),
        )
        .await;
    }
    let (status, body) = app
        .request(
            "GET",
            "/api/tenants/acme/notifications?unread_only=false&page=2&page_size=2",
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 3);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Analytics
// =============================================================================

#[tokio::test]
async fn test_analytics_access_and_counts() {
    let app = TestApp::new().await;
    let (admin, instructor, learner) = classroom(&app).await;
    let (_, body) = app.request("GET", "/api/auth/me", Some(&learner), None).await;
    let learner_id = body["id"].as_str().unwrap().to_string();
    let (_, body) = app.request("GET", "/api/auth/me", Some(&instructor), None).await;
    let instructor_id = body["id"].as_str().unwrap().to_string();

    let course_id = create_course(&app, &instructor, "Rust 101").await;
    let module_id = create_module(&app, &instructor, &course_id, "Only").await;
    let course_uri = format!("/api/tenants/acme/courses/{}", course_id);
    app.request("POST", &format!("{}/publish", course_uri), Some(&instructor), None)
        .await;
    app.request("POST", &format!("{}/enroll", course_uri), Some(&learner), None)
        .await;
    app.request(
        "POST",
        &format!("{}/modules/{}/complete", course_uri, module_id),
        Some(&learner),
        Some(json!({"score": 88})),
    )
    .await;

    let (status, _) = app
        .request("GET", "/api/tenants/acme/analytics/overview", Some(&learner), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request("GET", "/api/tenants/acme/analytics/overview", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_courses"], 1);
    assert_eq!(body["published_courses"], 1);
    assert_eq!(body["members"]["total"], 3);
    assert_eq!(body["members"]["learners"], 1);
    assert_eq!(body["enrollments"], 1);
    assert_eq!(body["module_completions"], 1);

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/tenants/acme/analytics/courses/{}", course_id),
            Some(&instructor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enrolled_learners"], 1);
    assert_eq!(body["completion_rate"], 100.0);
    assert_eq!(body["average_score"], 88.0);

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/tenants/acme/analytics/learners/{}", learner_id),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed_courses"], 1);

    let (status, _) = app
        .request(
            "GET",
            &format!("/api/tenants/acme/analytics/learners/{}", instructor_id),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
