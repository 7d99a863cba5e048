#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

use site_access::authz::AuthzConfig;
use site_access::create_app_with;
use site_access::db::SqliteStore;
use site_access::jwt::JwtConfig;
use site_access::models::project::{Project, ProjectCreateRequest};
use site_access::models::user::{User, UserCreateRequest};

pub const SECRET: &str = "test-secret";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub store: SqliteStore,
    pub jwt: JwtConfig,
    // keeps the database file alive
    _dir: TempDir,
}

pub async fn setup() -> Result<TestApp> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let jwt = JwtConfig::new(SECRET, 1);
    let app = create_app_with(pool.clone(), jwt.clone(), AuthzConfig::default()).await?;

    Ok(TestApp {
        app,
        store: SqliteStore::new(pool.clone()),
        pool,
        jwt,
        _dir: dir,
    })
}

impl TestApp {
    pub async fn user(&self, name: &str, role: &str) -> Result<User> {
        Ok(self
            .store
            .create_user(&UserCreateRequest {
                name: name.to_string(),
                phone: None,
                global_role: Some(role.to_string()),
                d1_user_id: None,
            })
            .await?)
    }

    pub async fn project(&self, name: &str) -> Result<Project> {
        Ok(self
            .store
            .create_project(
                &ProjectCreateRequest {
                    name: name.to_string(),
                    opportunity_id: None,
                },
                None,
            )
            .await?)
    }

    /// A fresh login session for `user`.
    pub fn token(&self, user: &User) -> Result<String> {
        self.token_for(user.id)
    }

    pub fn token_for(&self, user_id: Uuid) -> Result<String> {
        Ok(self.jwt.encode(user_id, Uuid::new_v4())?)
    }

    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }

        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp: Response = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok((status, value))
    }
}
