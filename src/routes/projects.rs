use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Capability, PermissionContext};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::project::{Project, ProjectCreateRequest, ProjectWithAccess};

async fn with_access(ctx: &PermissionContext, project: Project) -> AppResult<ProjectWithAccess> {
    let capabilities = ctx.effective_capabilities(project.id, None).await?;
    let role = ctx.user_role_in_team(project.id, None).await;
    Ok(ProjectWithAccess {
        project,
        role,
        capabilities,
    })
}

/// Admins see every project; everyone else (including a simulated user)
/// sees the projects they can view.
#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "Projects visible to the context user", body = [ProjectWithAccess])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    ctx: PermissionContext,
) -> AppResult<Json<Vec<ProjectWithAccess>>> {
    let projects = if ctx.is_context_admin() {
        state.store.list_projects().await?
    } else {
        state.store.list_projects_for_member(ctx.current_context_user().id).await?
    };

    let mut visible = Vec::with_capacity(projects.len());
    for project in projects {
        let entry = with_access(&ctx, project).await?;
        if entry.capabilities.view {
            visible.push(entry);
        }
    }

    Ok(Json(visible))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 403, description = "Administrator access required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    ctx.require_context_admin()?;

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("project name is required"));
    }

    let project = state.store.create_project(&payload, Some(ctx.real_user().id)).await?;
    log_activity(&state.event_bus, "created", &ctx.actor(), &project);

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = ProjectWithAccess),
        (status = 403, description = "No view access"),
        (status = 404, description = "Unknown project")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProjectWithAccess>> {
    ctx.require(id, None, Capability::View).await?;

    let project = state
        .store
        .find_project(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("project {id}")))?;

    Ok(Json(with_access(&ctx, project).await?))
}
