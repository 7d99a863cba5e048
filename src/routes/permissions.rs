use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Capability, PermissionContext};
use crate::errors::AppResult;
use crate::models::membership::{MemberAccess, ProjectMembership};
use crate::models::permission::{PermissionCheck, PermissionSummary, TeamQuery};
use crate::utils::normalize_team_id;

/// Membership lookup: one entry per member with their team contexts and
/// stored flags.
#[utoipa::path(
    get,
    path = "/projects/{id}/permissions",
    tag = "Permissions",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Stored access per member", body = [MemberAccess])),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<MemberAccess>>> {
    ctx.require(id, None, Capability::View).await?;

    let rows = state.resolver.list_members(id).await?;

    let mut by_user: BTreeMap<Uuid, Vec<ProjectMembership>> = BTreeMap::new();
    for row in rows {
        by_user.entry(row.user_id).or_default().push(row);
    }

    let access = by_user
        .into_iter()
        .filter_map(|(user_id, rows)| MemberAccess::from_rows(user_id, &rows))
        .collect();

    Ok(Json(access))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/permissions/me",
    tag = "Permissions",
    params(("id" = Uuid, Path, description = "Project id"), TeamQuery),
    responses(
        (status = 200, description = "Effective capabilities of the context user", body = PermissionSummary),
        (status = 404, description = "Unknown project"),
        (status = 503, description = "Permission store unavailable")
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_permissions(
    ctx: PermissionContext,
    Path(id): Path<Uuid>,
    Query(query): Query<TeamQuery>,
) -> AppResult<Json<PermissionSummary>> {
    let team_id = normalize_team_id(query.team_id.as_deref());
    let capabilities = ctx.effective_capabilities(id, team_id.as_deref()).await?;
    let role = ctx.user_role_in_team(id, team_id.as_deref()).await;

    Ok(Json(PermissionSummary {
        project_id: id,
        team_id,
        user_id: ctx.current_context_user().id,
        role,
        capabilities,
        is_simulating: ctx.is_simulating(),
    }))
}

/// Never errors on an unknown capability name or an unreachable store; the
/// answer is simply `false`.
#[utoipa::path(
    get,
    path = "/projects/{id}/permissions/check/{capability}",
    tag = "Permissions",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("capability" = String, Path, description = "view, edit, manage_members or view_other_teams"),
        TeamQuery
    ),
    responses((status = 200, description = "Check result", body = PermissionCheck)),
    security(("bearerAuth" = []))
)]
pub async fn check_permission(
    ctx: PermissionContext,
    Path((id, capability)): Path<(Uuid, String)>,
    Query(query): Query<TeamQuery>,
) -> Json<PermissionCheck> {
    let team_id = normalize_team_id(query.team_id.as_deref());
    let allowed = ctx.has_permission(id, team_id.as_deref(), &capability).await;
    Json(PermissionCheck { capability, allowed })
}
