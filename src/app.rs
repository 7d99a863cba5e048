use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{
    AuthzConfig, CapabilityCache, IdentityResolver, PermissionResolver, PerspectiveController, SessionRegistry,
};
use crate::db::SqliteStore;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, members, permissions, perspective, projects, users};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub jwt: Arc<JwtConfig>,
    pub identity: Arc<IdentityResolver>,
    pub resolver: Arc<PermissionResolver>,
    pub perspectives: PerspectiveController,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, authz: AuthzConfig, event_bus: EventBus) -> Self {
        let store = Arc::new(SqliteStore::new(pool));
        let jwt = Arc::new(jwt);

        let resolver = Arc::new(PermissionResolver::new(
            store.clone(),
            CapabilityCache::with_capacity(authz.cache_enabled, authz.cache_capacity),
            authz.store_timeout,
        ));
        let identity = Arc::new(IdentityResolver::new(jwt.clone(), store.clone(), authz.store_timeout));
        let perspectives = PerspectiveController::new(
            SessionRegistry::new(),
            store.clone(),
            resolver.clone(),
            event_bus.clone(),
        );

        Self {
            store,
            jwt,
            identity,
            resolver,
            perspectives,
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let authz_config = AuthzConfig::from_env()?;
    create_app_with(pool, jwt_config, authz_config).await
}

/// Builds the router with explicit configuration and starts the activity
/// listener on the same pool.
pub async fn create_app_with(pool: SqlitePool, jwt: JwtConfig, authz: AuthzConfig) -> Result<Router, AppError> {
    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    tracing::debug!(
        store_timeout_ms = authz.store_timeout.as_millis() as u64,
        cache_enabled = authz.cache_enabled,
        cache_capacity = authz.cache_capacity,
        "authorization configured"
    );

    let state = AppState::new(pool, jwt, authz, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route("/:id", get(projects::get_project))
        .route("/:id/permissions", get(permissions::list_permissions))
        .route("/:id/permissions/me", get(permissions::my_permissions))
        .route("/:id/permissions/check/:capability", get(permissions::check_permission))
        .route("/:id/members", get(members::list_members).post(members::add_member))
        .route(
            "/:id/members/:user_id",
            put(members::upsert_member).delete(members::remove_member),
        );

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id", put(users::update_user));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/perspective",
            get(perspective::get_perspective)
                .post(perspective::switch_perspective)
                .delete(perspective::end_perspective),
        )
        .nest("/auth", auth_routes)
        .nest("/projects", project_routes)
        .nest("/users", user_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
