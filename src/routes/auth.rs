use axum::http::StatusCode;
use axum::Json;

use crate::authz::PermissionContext;
use crate::errors::AppResult;
use crate::models::user::MeResponse;

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Real and context user", body = MeResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(ctx: PermissionContext) -> AppResult<Json<MeResponse>> {
    Ok(Json(MeResponse {
        real_user: ctx.real_user().clone(),
        context_user: ctx.current_context_user().clone(),
        is_real_admin: ctx.is_real_admin(),
        is_simulating: ctx.is_simulating(),
    }))
}

/// Ends the session's impersonation. Tokens are stateless and stay valid
/// until they expire.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 204, description = "Session impersonation cleared")),
    security(("bearerAuth" = []))
)]
pub async fn logout(mut ctx: PermissionContext) -> StatusCode {
    ctx.end_session().await;
    tracing::info!(user_id = %ctx.real_user().id, "logged out");
    StatusCode::NO_CONTENT
}
