use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::row_parsers::{membership_from_row, project_from_row, user_from_row};
use crate::authz::{MembershipStore, Role, UserDirectory};
use crate::errors::{AppError, AppResult};
use crate::models::membership::{MemberAccess, MembershipFields, ProjectMembership};
use crate::models::project::{Project, ProjectCreateRequest, STATUS_ACTIVE};
use crate::models::user::{User, UserCreateRequest, UserUpdateRequest};
use crate::utils::utc_now;

const USER_COLUMNS: &str = "id, name, phone, global_role, d1_user_id, is_active, created_at, updated_at";
const PROJECT_COLUMNS: &str = "id, name, opportunity_id, status, created_by, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str = "id, project_id, user_id, team_id, role, can_view, can_edit, can_manage_members, \
     can_view_other_teams, is_active, updated_by, created_at, updated_at";

/// The project-wide membership row is stored with an empty team id so the
/// unique key (project_id, user_id, team_id) also covers it.
fn team_key(team_id: Option<&str>) -> &str {
    team_id.unwrap_or("")
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(message),
        _ => AppError::Database(err),
    }
}

/// SQLite-backed user directory, project registry and membership store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // USERS
    // =========================================================================

    pub async fn create_user(&self, payload: &UserCreateRequest) -> AppResult<User> {
        let id = Uuid::new_v4();
        let now = utc_now();
        let role = Role::from_global(payload.global_role.as_deref());

        sqlx::query(
            "INSERT INTO users (id, name, phone, global_role, d1_user_id, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(id.to_string())
        .bind(payload.name.trim())
        .bind(payload.phone.as_deref().map(str::trim))
        .bind(role.as_str())
        .bind(&payload.d1_user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "User already exists"))?;

        self.find_user(id)
            .await?
            .ok_or_else(|| AppError::internal("user vanished after insert"))
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    pub async fn update_user(&self, id: Uuid, payload: &UserUpdateRequest) -> AppResult<User> {
        let current = self
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id}")))?;

        let name = payload.name.as_deref().map(str::trim).unwrap_or(&current.name).to_string();
        let phone = payload.phone.clone().or(current.phone);
        let role = payload
            .global_role
            .as_deref()
            .map(|raw| Role::from_global(Some(raw)))
            .unwrap_or(current.global_role);
        let d1_user_id = payload.d1_user_id.clone().or(current.d1_user_id);
        let is_active = payload.is_active.unwrap_or(current.is_active);

        sqlx::query(
            "UPDATE users SET name = ?, phone = ?, global_role = ?, d1_user_id = ?, is_active = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&name)
        .bind(&phone)
        .bind(role.as_str())
        .bind(&d1_user_id)
        .bind(is_active)
        .bind(utc_now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "phone already in use"))?;

        self.find_user(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id}")))
    }

    // =========================================================================
    // PROJECTS
    // =========================================================================

    pub async fn create_project(&self, payload: &ProjectCreateRequest, created_by: Option<Uuid>) -> AppResult<Project> {
        let id = Uuid::new_v4();
        let now = utc_now();

        sqlx::query(
            "INSERT INTO projects (id, name, opportunity_id, status, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(payload.name.trim())
        .bind(&payload.opportunity_id)
        .bind(STATUS_ACTIVE)
        .bind(created_by.map(|id| id.to_string()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_project(id)
            .await?
            .ok_or_else(|| AppError::internal("project vanished after insert"))
    }

    pub async fn find_project(&self, id: Uuid) -> AppResult<Option<Project>> {
        let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    pub async fn list_projects(&self) -> AppResult<Vec<Project>> {
        let rows = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    /// Projects where the user holds at least one active membership row.
    pub async fn list_projects_for_member(&self, user_id: Uuid) -> AppResult<Vec<Project>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id IN \
             (SELECT project_id FROM project_memberships WHERE user_id = ? AND is_active = 1) \
             ORDER BY created_at DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn membership_rows(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Vec<ProjectMembership>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM project_memberships WHERE project_id = ? AND user_id = ?"
        ))
        .bind(project_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(membership_from_row).collect()
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl MembershipStore for SqliteStore {
    async fn project_exists(&self, project_id: Uuid) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM projects WHERE id = ?")
            .bind(project_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn find_access(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<MemberAccess>> {
        let rows = self.membership_rows(project_id, user_id).await?;
        Ok(MemberAccess::from_rows(user_id, &rows))
    }

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
    ) -> AppResult<Option<ProjectMembership>> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM project_memberships WHERE project_id = ? AND user_id = ? AND team_id = ?"
        ))
        .bind(project_id.to_string())
        .bind(user_id.to_string())
        .bind(team_key(team_id))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(membership_from_row).transpose()
    }

    async fn upsert_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
        fields: &MembershipFields,
        actor_id: Uuid,
    ) -> AppResult<ProjectMembership> {
        let now = utc_now();
        let caps = fields.capabilities;

        sqlx::query(
            r#"
            INSERT INTO project_memberships
                (id, project_id, user_id, team_id, role, can_view, can_edit, can_manage_members,
                 can_view_other_teams, is_active, updated_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT(project_id, user_id, team_id) DO UPDATE SET
                role = excluded.role,
                can_view = excluded.can_view,
                can_edit = excluded.can_edit,
                can_manage_members = excluded.can_manage_members,
                can_view_other_teams = excluded.can_view_other_teams,
                is_active = 1,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id.to_string())
        .bind(user_id.to_string())
        .bind(team_key(team_id))
        .bind(fields.role.as_str())
        .bind(caps.can_view)
        .bind(caps.can_edit)
        .bind(caps.can_manage_members)
        .bind(caps.can_view_other_teams)
        .bind(actor_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_membership(project_id, user_id, team_id)
            .await?
            .ok_or_else(|| AppError::internal("membership vanished after upsert"))
    }

    async fn deactivate_memberships(&self, project_id: Uuid, user_id: Uuid, actor_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE project_memberships SET is_active = 0, updated_by = ?, updated_at = ? \
             WHERE project_id = ? AND user_id = ? AND is_active = 1",
        )
        .bind(actor_id.to_string())
        .bind(utc_now())
        .bind(project_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_members(&self, project_id: Uuid) -> AppResult<Vec<ProjectMembership>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM project_memberships \
             WHERE project_id = ? AND is_active = 1 ORDER BY user_id, team_id"
        ))
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(membership_from_row).collect()
    }
}
