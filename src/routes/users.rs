use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{PermissionContext, UserDirectory};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity_with_context;
use crate::models::user::{User, UserCreateRequest, UserUpdateRequest};

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Administrator access required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, ctx: PermissionContext) -> AppResult<Json<Vec<User>>> {
    ctx.require_context_admin()?;
    Ok(Json(state.store.list_users().await?))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 409, description = "User already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    ctx.require_context_admin()?;

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name is required"));
    }

    let user = state.store.create_user(&payload).await?;
    log_activity_with_context(&state.event_bus, "created", &ctx.actor(), &user, None, None);

    Ok((StatusCode::CREATED, Json(user)))
}

/// A change of global role or activation status drops every cached
/// capability of the user.
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "Unknown user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    ctx: PermissionContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    ctx.require_context_admin()?;

    let previous = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id}")))?;

    let user = state.store.update_user(id, &payload).await?;

    if user.global_role != previous.global_role || user.is_active != previous.is_active {
        state.resolver.cache().invalidate_user(id).await;
        tracing::info!(user_id = %id, role = %user.global_role, active = user.is_active, "user access changed");
    }

    log_activity_with_context(&state.event_bus, "updated", &ctx.actor(), &user, Some(&previous), None);

    Ok(Json(user))
}
