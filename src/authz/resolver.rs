use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::cache::{CacheKey, CapabilityCache};
use super::capability::{Capability, CapabilitySet};
use super::store::MembershipStore;
use super::{bounded, Role};
use crate::errors::{AppError, AppResult};
use crate::models::membership::{MemberAccess, MembershipFields, ProjectMembership};
use crate::models::user::User;

/// The identity a capability question is asked about.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationSubject<'a> {
    pub user: &'a User,
    /// True when `user` is a simulated identity. Simulated users never get
    /// the admin override, whatever their stored global role.
    pub simulating: bool,
}

impl<'a> EvaluationSubject<'a> {
    pub fn real(user: &'a User) -> Self {
        Self { user, simulating: false }
    }

    pub fn simulated(user: &'a User) -> Self {
        Self { user, simulating: true }
    }
}

/// Role a user falls back to in a team of the project they are not assigned to.
fn team_fallback_role(base: Role) -> Role {
    match base {
        Role::Leader => Role::Member,
        other => other,
    }
}

/// Merges one user's stored access into an effective capability set.
///
/// Stored flags win over the role default table. Inside a team, the team row's
/// flags win over the project-wide ones and only a team leader manages
/// members. Admin memberships are not narrowed by team.
pub fn resolve_capabilities(access: &MemberAccess, team_id: Option<&str>) -> CapabilitySet {
    let defaults = access.role.default_capabilities();

    if access.role.is_admin() {
        return access.capabilities.over(defaults);
    }

    let team_id = match team_id {
        Some(team_id) if !access.team_contexts.is_empty() => team_id,
        _ => return access.capabilities.over(defaults),
    };

    match access.team(team_id) {
        Some(ctx) => {
            let mut caps = ctx.capabilities.or(access.capabilities).over(defaults);
            caps.manage_members = ctx.role == Role::Leader;
            caps
        }
        None => {
            let mut caps = access.capabilities.over(defaults);
            caps.manage_members = access
                .capabilities
                .can_manage_members
                .unwrap_or_else(|| team_fallback_role(access.role).default_capabilities().manage_members);
            caps
        }
    }
}

/// Computes effective capabilities through a read-through cache and keeps the
/// cache coherent with every membership write made through it.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn MembershipStore>,
    cache: CapabilityCache,
    timeout: Duration,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn MembershipStore>, cache: CapabilityCache, timeout: Duration) -> Self {
        Self { store, cache, timeout }
    }

    pub fn cache(&self) -> &CapabilityCache {
        &self.cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn effective_capabilities(
        &self,
        subject: EvaluationSubject<'_>,
        project_id: Uuid,
        team_id: Option<&str>,
    ) -> AppResult<CapabilitySet> {
        let user = subject.user;

        if user.global_role.is_admin() && !subject.simulating {
            tracing::debug!(user_id = %user.id, project_id = %project_id, "admin override");
            return Ok(CapabilitySet::all());
        }

        let key = CacheKey::new(user.id, project_id, team_id);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let observed_epoch = self.cache.epoch().await;

        if !bounded(self.timeout, "project_exists", self.store.project_exists(project_id)).await? {
            return Err(AppError::not_found(format!("project {project_id}")));
        }

        let access = bounded(self.timeout, "find_access", self.store.find_access(project_id, user.id)).await?;

        // only teams the user belongs to get their own cache entry; any other
        // team string is resolved but not cached
        let (caps, cacheable) = match access {
            Some(access) => {
                let known_team = team_id.map_or(true, |team_id| access.team(team_id).is_some());
                (resolve_capabilities(&access, team_id), known_team)
            }
            None => {
                tracing::debug!(user_id = %user.id, project_id = %project_id, "no membership");
                (CapabilitySet::none(), team_id.is_none())
            }
        };

        if !cacheable {
            return Ok(caps);
        }

        if !self.cache.insert(key, caps, observed_epoch).await {
            tracing::debug!(user_id = %user.id, project_id = %project_id, "capability result not cached");
        }

        Ok(caps)
    }

    /// Boolean check that never errors. Unknown capability names and every
    /// failure to resolve are a denial.
    pub async fn has_permission(
        &self,
        subject: EvaluationSubject<'_>,
        project_id: Uuid,
        team_id: Option<&str>,
        capability: &str,
    ) -> bool {
        let Some(capability) = Capability::parse(capability) else {
            tracing::debug!(user_id = %subject.user.id, capability = %capability, "unknown capability denied");
            return false;
        };

        match self.effective_capabilities(subject, project_id, team_id).await {
            Ok(caps) => caps.allows(capability),
            Err(err) => {
                tracing::warn!(
                    user_id = %subject.user.id,
                    project_id = %project_id,
                    capability = %capability.as_str(),
                    error = %err,
                    "permission check failed closed"
                );
                false
            }
        }
    }

    /// Role shown for the subject inside a team (or project-wide). Anything
    /// that cannot be resolved is `Guest`.
    pub async fn role_in_team(&self, subject: EvaluationSubject<'_>, project_id: Uuid, team_id: Option<&str>) -> Role {
        if subject.user.global_role.is_admin() && !subject.simulating {
            return Role::Admin;
        }

        match self.member_access(project_id, subject.user.id).await {
            Ok(Some(access)) => match team_id {
                Some(team_id) if !access.team_contexts.is_empty() && !access.role.is_admin() => access
                    .team(team_id)
                    .map(|ctx| ctx.role)
                    .unwrap_or_else(|| team_fallback_role(access.role)),
                _ => access.role,
            },
            Ok(None) => Role::Guest,
            Err(err) => {
                tracing::warn!(user_id = %subject.user.id, project_id = %project_id, error = %err, "role lookup failed");
                Role::Guest
            }
        }
    }

    pub async fn member_access(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<MemberAccess>> {
        bounded(self.timeout, "find_access", self.store.find_access(project_id, user_id)).await
    }

    pub async fn project_exists(&self, project_id: Uuid) -> AppResult<bool> {
        bounded(self.timeout, "project_exists", self.store.project_exists(project_id)).await
    }

    pub async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
    ) -> AppResult<Option<ProjectMembership>> {
        bounded(
            self.timeout,
            "find_membership",
            self.store.find_membership(project_id, user_id, team_id),
        )
        .await
    }

    pub async fn list_members(&self, project_id: Uuid) -> AppResult<Vec<ProjectMembership>> {
        bounded(self.timeout, "list_members", self.store.list_members(project_id)).await
    }

    /// Writes the row, then drops every cached result for the user on the
    /// project before returning.
    pub async fn upsert_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        team_id: Option<&str>,
        fields: &MembershipFields,
        actor_id: Uuid,
    ) -> AppResult<ProjectMembership> {
        let result = bounded(
            self.timeout,
            "upsert_membership",
            self.store.upsert_membership(project_id, user_id, team_id, fields, actor_id),
        )
        .await;
        // a timed-out write may still have landed
        self.cache.invalidate_membership(user_id, project_id).await;
        result
    }

    pub async fn remove_membership(&self, project_id: Uuid, user_id: Uuid, actor_id: Uuid) -> AppResult<u64> {
        let result = bounded(
            self.timeout,
            "deactivate_memberships",
            self.store.deactivate_memberships(project_id, user_id, actor_id),
        )
        .await;
        self.cache.invalidate_membership(user_id, project_id).await;

        match result? {
            0 => Err(AppError::not_found(format!("no active membership for user {user_id}"))),
            removed => Ok(removed),
        }
    }
}
