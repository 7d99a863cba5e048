//! Project member administration.
//!
//! Adding or changing a member needs `manage_members` in the target team.
//! Handing out `admin` or `owner`, widening flags past the role defaults and
//! removing people are reserved for administrators acting as themselves.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Capability, PermissionContext, Role, UserDirectory};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::models::membership::{
    AddMemberRequest, MemberRoster, MembershipFields, MembershipRemoval, ProjectMembership, UpsertMembershipRequest,
};
use crate::utils::normalize_team_id;

/// Role names accepted from clients. Unlike stored rows, an unknown name is
/// rejected instead of becoming `guest`.
fn parse_role_input(raw: &str) -> AppResult<Role> {
    let role = Role::normalize(raw);
    if role == Role::Guest && !raw.trim().eq_ignore_ascii_case("guest") {
        return Err(AppError::bad_request(format!("unknown role '{}'", raw.trim())));
    }
    Ok(role)
}

fn authorize_role_grant(ctx: &PermissionContext, role: Role) -> AppResult<()> {
    match role {
        Role::SuperAdmin | Role::Admin | Role::Owner => ctx.require_context_admin(),
        Role::Leader | Role::Member | Role::Guest => Ok(()),
    }
}

/// Limits on non-admin writes: no flag above the role defaults, and no
/// overwriting a row that outranks the caller in the same scope.
async fn authorize_row_write(
    ctx: &PermissionContext,
    project_id: Uuid,
    team_id: Option<&str>,
    fields: &MembershipFields,
    previous: Option<&ProjectMembership>,
) -> AppResult<()> {
    if ctx.is_context_admin() {
        return Ok(());
    }

    if fields.capabilities.grants_beyond(fields.role.default_capabilities()) {
        return Err(AppError::forbidden("only administrators can grant capabilities beyond the role defaults"));
    }

    if let Some(row) = previous.filter(|row| row.is_active) {
        let own_role = ctx.role_in_team(project_id, team_id).await;
        if row.role.rank() > own_role.rank() {
            tracing::warn!(
                user_id = %ctx.real_user().id,
                target_user_id = %row.user_id,
                project_id = %project_id,
                target_role = %row.role,
                "refused overwrite of higher-ranked membership"
            );
            return Err(AppError::forbidden(format!("cannot change a {} membership", row.role)));
        }
    }

    Ok(())
}

async fn ensure_active_user(state: &AppState, user_id: Uuid) -> AppResult<()> {
    match state.store.find_user(user_id).await? {
        Some(user) if user.is_active => Ok(()),
        _ => Err(AppError::not_found(format!("user {user_id}"))),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Active members grouped by role", body = MemberRoster),
        (status = 403, description = "No view access"),
        (status = 404, description = "Unknown project")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MemberRoster>> {
    ctx.require(id, None, Capability::View).await?;
    let rows = state.resolver.list_members(id).await?;
    Ok(Json(MemberRoster::group(rows)))
}

/// Adds a brand-new member with every capability taken from the role
/// default table.
#[utoipa::path(
    post,
    path = "/projects/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = ProjectMembership),
        (status = 403, description = "Missing manage_members"),
        (status = 409, description = "User already exists in this project")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<ProjectMembership>)> {
    let role = parse_role_input(&payload.role)?;
    let team_id = normalize_team_id(payload.team_id.as_deref());

    ctx.require(id, team_id.as_deref(), Capability::ManageMembers).await?;
    authorize_role_grant(&ctx, role)?;
    ensure_active_user(&state, payload.user_id).await?;

    let existing = state
        .resolver
        .find_membership(id, payload.user_id, team_id.as_deref())
        .await?;
    if existing.is_some_and(|row| row.is_active) {
        return Err(AppError::conflict("User already exists"));
    }

    let membership = state
        .resolver
        .upsert_membership(
            id,
            payload.user_id,
            team_id.as_deref(),
            &MembershipFields::with_role_defaults(role),
            ctx.real_user().id,
        )
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "added",
        &ctx.actor(),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(membership)))
}

/// Creates or overwrites the membership row for `(project, user, team)`.
/// Flags left out of the body fall back to role defaults at resolution time.
#[utoipa::path(
    put,
    path = "/projects/{id}/members/{user_id}",
    tag = "Members",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    request_body = UpsertMembershipRequest,
    responses(
        (status = 200, description = "Membership stored", body = ProjectMembership),
        (status = 403, description = "Missing manage_members, flags beyond role defaults or a higher-ranked row")
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_member(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(payload): Json<UpsertMembershipRequest>,
) -> AppResult<Json<ProjectMembership>> {
    let role = parse_role_input(&payload.role)?;
    let team_id = normalize_team_id(payload.team_id.as_deref());

    ctx.require(id, team_id.as_deref(), Capability::ManageMembers).await?;
    authorize_role_grant(&ctx, role)?;
    ensure_active_user(&state, user_id).await?;

    let previous = state.resolver.find_membership(id, user_id, team_id.as_deref()).await?;
    let fields = MembershipFields::new(role).with_capabilities(payload.capabilities);
    authorize_row_write(&ctx, id, team_id.as_deref(), &fields, previous.as_ref()).await?;

    let membership = state
        .resolver
        .upsert_membership(id, user_id, team_id.as_deref(), &fields, ctx.real_user().id)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "upserted",
        &ctx.actor(),
        &membership,
        previous.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(membership))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/members/{user_id}",
    tag = "Members",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    responses(
        (status = 204, description = "Member deactivated"),
        (status = 403, description = "Administrator access required"),
        (status = 404, description = "No active membership")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    ctx.require_context_admin()?;

    if !state.resolver.project_exists(id).await? {
        return Err(AppError::not_found(format!("project {id}")));
    }

    let rows_deactivated = state.resolver.remove_membership(id, user_id, ctx.real_user().id).await?;

    let removal = MembershipRemoval {
        project_id: id,
        user_id,
        rows_deactivated,
    };
    log_activity(&state.event_bus, "removed", &ctx.actor(), &removal);

    Ok(StatusCode::NO_CONTENT)
}
