//! Tenant lifecycle, membership management and the tenant scoping middleware

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Extension, Json,
};
use lms_common::auth::normalize_email;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::db::memberships::{self, Member};
use crate::db::tenants::{self, Tenant};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::services::provisioning::validate_name;
use crate::services::CreateTenant;
use crate::tenancy::{Role, TenantContext};
use crate::AppState;

/// Tenant scoping middleware for `/api/tenants/:slug/...`
///
/// Runs after `auth_middleware`. Resolves the slug to an active tenant,
/// requires the caller to be a member (403 otherwise) and inserts a
/// `TenantContext` carrying the caller's role and the tenant's pool.
pub async fn tenant_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let slug = params
        .get("slug")
        .ok_or_else(|| ApiError::BadRequest("Missing tenant slug".to_string()))?;
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let tenant = tenants::get_by_slug(&state.db, slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tenant {}", slug)))?;

    let role = memberships::get_role(&state.db, tenant.id, auth.id)
        .await?
        .ok_or_else(|| ApiError::Forbidden(format!("Not a member of tenant {}", slug)))?;

    let pool = state.tenants.get(&tenant).await?;
    debug!("{} acting as {} in {}", auth.email, role, slug);

    request
        .extensions_mut()
        .insert(TenantContext { tenant, role, pool });
    Ok(next.run(request).await)
}

/// Tenant as returned to a member, with the caller's role
#[derive(Debug, Serialize)]
pub struct TenantResponse {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub role: Role,
}

/// POST /api/tenants
///
/// Any authenticated user may create a tenant and becomes its admin.
pub async fn create_tenant(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateTenant>,
) -> ApiResult<(StatusCode, Json<TenantResponse>)> {
    let tenant = state.provisioner.create_tenant(req, auth.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(TenantResponse {
            tenant,
            role: Role::Admin,
        }),
    ))
}

/// GET /api/tenants
pub async fn list_tenants(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<Tenant>>> {
    let page = tenants::list_for_user(&state.db, auth.id, query.page, query.page_size).await?;
    Ok(Json(page))
}

/// GET /api/tenants/:slug
pub async fn get_tenant(Extension(ctx): Extension<TenantContext>) -> Json<TenantResponse> {
    Json(TenantResponse {
        tenant: ctx.tenant,
        role: ctx.role,
    })
}

#[derive(Debug, Deserialize)]
pub struct RenameTenantRequest {
    pub name: String,
}

/// PUT /api/tenants/:slug
pub async fn rename_tenant(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<RenameTenantRequest>,
) -> ApiResult<Json<TenantResponse>> {
    ctx.require(Role::Admin)?;
    let name = validate_name(&req.name)?;

    tenants::rename(&state.db, ctx.tenant.id, &name).await?;
    let tenant = tenants::get_by_slug(&state.db, ctx.slug())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tenant {}", ctx.slug())))?;

    info!("Tenant {} renamed to {}", tenant.slug, tenant.name);
    Ok(Json(TenantResponse {
        tenant,
        role: ctx.role,
    }))
}

/// DELETE /api/tenants/:slug
pub async fn delete_tenant(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<StatusCode> {
    ctx.require(Role::Admin)?;
    // Drop the request's pool handle before the file goes away
    let TenantContext { tenant, pool, .. } = ctx;
    drop(pool);

    state.provisioner.delete_tenant(&tenant).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tenants/:slug/members
pub async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<Vec<Member>>> {
    let members = memberships::list_members(&state.db, ctx.tenant.id).await?;
    Ok(Json(members))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    pub role: Role,
}

/// POST /api/tenants/:slug/members
pub async fn add_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    ctx.require(Role::Admin)?;

    let email = normalize_email(&req.email);
    let user = users::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No user with email {}", email)))?;

    memberships::insert_membership(&state.db, ctx.tenant.id, user.id, req.role)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ApiError::Conflict(format!("{} is already a member", email))
            } else {
                e.into()
            }
        })?;
    info!("Added {} to {} as {}", user.id, ctx.slug(), req.role);

    let member = find_member(&state, &ctx, user.id).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[derive(Debug, Deserialize)]
pub struct MemberPath {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

/// PUT /api/tenants/:slug/members/:user_id
pub async fn change_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<MemberPath>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<Member>> {
    ctx.require(Role::Admin)?;

    let current = current_role(&state, &ctx, path.user_id).await?;
    if current == Role::Admin && req.role != Role::Admin {
        ensure_not_last_admin(&state, &ctx).await?;
    }

    memberships::update_role(&state.db, ctx.tenant.id, path.user_id, req.role).await?;
    info!("Changed role of {} in {} to {}", path.user_id, ctx.slug(), req.role);

    let member = find_member(&state, &ctx, path.user_id).await?;
    Ok(Json(member))
}

/// DELETE /api/tenants/:slug/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<MemberPath>,
) -> ApiResult<StatusCode> {
    ctx.require(Role::Admin)?;

    if current_role(&state, &ctx, path.user_id).await? == Role::Admin {
        ensure_not_last_admin(&state, &ctx).await?;
    }

    memberships::delete_membership(&state.db, ctx.tenant.id, path.user_id).await?;
    info!("Removed {} from {}", path.user_id, ctx.slug());
    Ok(StatusCode::NO_CONTENT)
}

async fn current_role(state: &AppState, ctx: &TenantContext, user_id: Uuid) -> ApiResult<Role> {
    memberships::get_role(&state.db, ctx.tenant.id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} is not a member", user_id)))
}

async fn ensure_not_last_admin(state: &AppState, ctx: &TenantContext) -> ApiResult<()> {
    let counts = memberships::count_by_role(&state.db, ctx.tenant.id).await?;
    if counts.get(&Role::Admin).copied().unwrap_or(0) <= 1 {
        return Err(ApiError::Conflict(
            "A tenant must keep at least one admin".to_string(),
        ));
    }
    Ok(())
}

async fn find_member(state: &AppState, ctx: &TenantContext, user_id: Uuid) -> ApiResult<Member> {
    memberships::list_members(&state.db, ctx.tenant.id)
        .await?
        .into_iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| ApiError::NotFound(format!("User {} is not a member", user_id)))
}
