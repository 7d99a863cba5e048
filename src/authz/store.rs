use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::membership::{MemberAccess, MembershipFields, ProjectMembership};
use crate::models::user::User;

/// Lookup of users by id. Implemented by the SQLite store and by in-memory
/// fakes in tests.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>>;
}

/// Persistent project memberships.
///
/// `team_id == None` addresses the project-wide row. Implementations must
/// report failures as errors and never as an empty result.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn project_exists(&self, project_id: Uuid) -> AppResult<bool>;

    /// Active rows of one user folded into a [`MemberAccess`].
    async fn find_access(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<MemberAccess>>;

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
    ) -> AppResult<Option<ProjectMembership>>;

    /// Insert or overwrite a row and mark it active. Idempotent.
    async fn upsert_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
        fields: &MembershipFields,
        actor_id: Uuid,
    ) -> AppResult<ProjectMembership>;

    /// Soft-deletes every row of the user in the project. Returns the number
    /// of rows that were active.
    async fn deactivate_memberships(&self, project_id: Uuid, user_id: Uuid, actor_id: Uuid) -> AppResult<u64>;

    async fn list_members(&self, project_id: Uuid) -> AppResult<Vec<ProjectMembership>>;
}
