use axum::Json;

use crate::authz::{DisplayRole, PermissionContext};
use crate::errors::AppResult;
use crate::models::perspective::{PerspectiveRequest, PerspectiveStatus};

/// Built from the snapshot taken at switch time; no store access.
fn status(ctx: &PermissionContext) -> PerspectiveStatus {
    let simulated = ctx.simulated();
    let membership = simulated.and_then(|sim| sim.access.clone());
    let role_in_project = simulated.map(|_| {
        membership
            .as_ref()
            .map_or(DisplayRole::Guest, |access| access.role.display())
    });

    PerspectiveStatus {
        real_user_id: ctx.real_user().id,
        is_real_admin: ctx.is_real_admin(),
        is_simulating: ctx.is_simulating(),
        simulated_user: simulated.map(|sim| sim.user.clone()),
        project_id: simulated.map(|sim| sim.project_id),
        role_in_project,
        membership,
        started_at: simulated.map(|sim| sim.started_at),
    }
}

#[utoipa::path(
    get,
    path = "/perspective",
    tag = "Perspective",
    responses((status = 200, description = "Current perspective", body = PerspectiveStatus)),
    security(("bearerAuth" = []))
)]
pub async fn get_perspective(ctx: PermissionContext) -> AppResult<Json<PerspectiveStatus>> {
    Ok(Json(status(&ctx)))
}

#[utoipa::path(
    post,
    path = "/perspective",
    tag = "Perspective",
    request_body = PerspectiveRequest,
    responses(
        (status = 200, description = "Perspective switched", body = PerspectiveStatus),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "Unknown user or project")
    ),
    security(("bearerAuth" = []))
)]
pub async fn switch_perspective(
    mut ctx: PermissionContext,
    Json(payload): Json<PerspectiveRequest>,
) -> AppResult<Json<PerspectiveStatus>> {
    ctx.switch_perspective(payload.target_user_id, payload.project_id).await?;
    Ok(Json(status(&ctx)))
}

#[utoipa::path(
    delete,
    path = "/perspective",
    tag = "Perspective",
    responses((status = 200, description = "Back to the real view", body = PerspectiveStatus)),
    security(("bearerAuth" = []))
)]
pub async fn end_perspective(mut ctx: PermissionContext) -> AppResult<Json<PerspectiveStatus>> {
    ctx.end_session().await;
    Ok(Json(status(&ctx)))
}
