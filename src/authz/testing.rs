//! In-memory stores for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{MembershipStore, UserDirectory};
use super::Role;
use crate::errors::{AppError, AppResult};
use crate::models::membership::{MemberAccess, MembershipFields, ProjectMembership};
use crate::models::user::User;
use crate::utils::utc_now;

pub fn user(global_role: Role) -> User {
    User {
        id: Uuid::new_v4(),
        name: format!("{global_role} user"),
        phone: None,
        global_role,
        d1_user_id: None,
        is_active: true,
        created_at: utc_now(),
        updated_at: utc_now(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    projects: RwLock<HashSet<Uuid>>,
    rows: RwLock<Vec<ProjectMembership>>,
    access_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_user(&self, user: &User) {
        self.users.write().await.insert(user.id, user.clone());
    }

    pub async fn add_project(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.projects.write().await.insert(id);
        id
    }

    /// Number of `find_access` calls that reached the store.
    pub fn access_reads(&self) -> usize {
        self.access_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn project_exists(&self, project_id: Uuid) -> AppResult<bool> {
        Ok(self.projects.read().await.contains(&project_id))
    }

    async fn find_access(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<MemberAccess>> {
        self.access_reads.fetch_add(1, Ordering::SeqCst);
        let rows: Vec<ProjectMembership> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.project_id == project_id)
            .cloned()
            .collect();
        Ok(MemberAccess::from_rows(user_id, &rows))
    }

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
    ) -> AppResult<Option<ProjectMembership>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|row| row.project_id == project_id && row.user_id == user_id && row.team_id.as_deref() == team_id)
            .cloned())
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
        let mut rows = self.rows.write().await;
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.project_id == project_id && row.user_id == user_id && row.team_id.as_deref() == team_id)
        {
            row.role = fields.role;
            row.capabilities = fields.capabilities;
            row.is_active = true;
            row.updated_by = Some(actor_id);
            row.updated_at = now;
            return Ok(row.clone());
        }

        let row = ProjectMembership {
            id: Uuid::new_v4(),
            project_id,
            user_id,
            team_id: team_id.map(str::to_owned),
            role: fields.role,
            capabilities: fields.capabilities,
            is_active: true,
            updated_by: Some(actor_id),
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn deactivate_memberships(&self, project_id: Uuid, user_id: Uuid, actor_id: Uuid) -> AppResult<u64> {
        let mut changed = 0;
        for row in self.rows.write().await.iter_mut() {
            if row.project_id == project_id && row.user_id == user_id && row.is_active {
                row.is_active = false;
                row.updated_by = Some(actor_id);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn list_members(&self, project_id: Uuid) -> AppResult<Vec<ProjectMembership>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.project_id == project_id && row.is_active)
            .cloned()
            .collect())
    }
}

/// Every call fails as if the database were gone.
pub struct BrokenStore;

#[async_trait]
impl MembershipStore for BrokenStore {
    async fn project_exists(&self, _project_id: Uuid) -> AppResult<bool> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn find_access(&self, _project_id: Uuid, _user_id: Uuid) -> AppResult<Option<MemberAccess>> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn find_membership(&self, _: Uuid, _: Uuid, _: Option<&str>) -> AppResult<Option<ProjectMembership>> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn upsert_membership(
        &self,
        _: Uuid,
        _: Uuid,
        _: Option<&str>,
        _: &MembershipFields,
        _: Uuid,
    ) -> AppResult<ProjectMembership> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn deactivate_memberships(&self, _: Uuid, _: Uuid, _: Uuid) -> AppResult<u64> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn list_members(&self, _: Uuid) -> AppResult<Vec<ProjectMembership>> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }
}

/// Wraps another store and sleeps before every lookup.
pub struct SlowStore {
    pub inner: Arc<MemoryStore>,
    pub delay: Duration,
}

#[async_trait]
impl MembershipStore for SlowStore {
    async fn project_exists(&self, project_id: Uuid) -> AppResult<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.project_exists(project_id).await
    }

    async fn find_access(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<MemberAccess>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_access(project_id, user_id).await
    }

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
    ) -> AppResult<Option<ProjectMembership>> {
        self.inner.find_membership(project_id, user_id, team_id).await
    }

    async fn upsert_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
        fields: &MembershipFields,
        actor_id: Uuid,
    ) -> AppResult<ProjectMembership> {
        self.inner.upsert_membership(project_id, user_id, team_id, fields, actor_id).await
    }

    async fn deactivate_memberships(&self, project_id: Uuid, user_id: Uuid, actor_id: Uuid) -> AppResult<u64> {
        self.inner.deactivate_memberships(project_id, user_id, actor_id).await
    }

    async fn list_members(&self, project_id: Uuid) -> AppResult<Vec<ProjectMembership>> {
        self.inner.list_members(project_id).await
    }
}
