use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::bounded;
use super::identity::RealIdentity;
use super::resolver::PermissionResolver;
use super::store::UserDirectory;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, AuditActor, EventBus};
use crate::models::membership::MemberAccess;
use crate::models::perspective::PerspectiveSwitch;
use crate::models::user::User;
use crate::utils::utc_now;

/// The identity an admin is currently viewing the system as.
#[derive(Debug, Clone)]
pub struct SimulatedIdentity {
    pub user: User,
    pub project_id: Uuid,
    /// Membership of `user` in `project_id` when the switch happened.
    pub access: Option<MemberAccess>,
    pub started_at: DateTime<Utc>,
    /// The simulation dies with the session token.
    pub expires_at: DateTime<Utc>,
}

/// Per-session impersonation state. A session has at most one simulated
/// identity; nothing here is persisted. Entries of expired sessions are
/// dropped on lookup and swept on every write.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, SimulatedIdentity>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: Uuid) -> Option<SimulatedIdentity> {
        let now = utc_now();
        {
            let sessions = self.inner.read().await;
            match sessions.get(&session_id) {
                None => return None,
                Some(identity) if identity.expires_at > now => return Some(identity.clone()),
                Some(_) => {}
            }
        }

        self.inner.write().await.remove(&session_id);
        tracing::debug!(session_id = %session_id, "expired simulation dropped");
        None
    }

    /// Returns the identity it replaced, unless that one had expired.
    pub async fn set(&self, session_id: Uuid, identity: SimulatedIdentity) -> Option<SimulatedIdentity> {
        let now = utc_now();
        let mut sessions = self.inner.write().await;
        sessions.retain(|_, existing| existing.expires_at > now);
        sessions.insert(session_id, identity)
    }

    pub async fn clear(&self, session_id: Uuid) -> Option<SimulatedIdentity> {
        self.inner.write().await.remove(&session_id)
    }
}

/// State machine `Real <-> Simulating(target)`, one per session.
#[derive(Clone)]
pub struct PerspectiveController {
    sessions: SessionRegistry,
    users: Arc<dyn UserDirectory>,
    resolver: Arc<PermissionResolver>,
    event_bus: EventBus,
}

impl PerspectiveController {
    pub fn new(
        sessions: SessionRegistry,
        users: Arc<dyn UserDirectory>,
        resolver: Arc<PermissionResolver>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            sessions,
            users,
            resolver,
            event_bus,
        }
    }

    pub async fn current(&self, session_id: Uuid) -> Option<SimulatedIdentity> {
        self.sessions.get(session_id).await
    }

    /// Starts (or retargets) a simulation. Only the real identity's stored
    /// global role is consulted; whatever is currently simulated grants nothing.
    pub async fn begin(&self, real: &RealIdentity, target_user_id: Uuid, project_id: Uuid) -> AppResult<SimulatedIdentity> {
        if !real.is_admin() {
            tracing::warn!(user_id = %real.user.id, target_user_id = %target_user_id, "non-admin perspective switch refused");
            return Err(AppError::forbidden("only administrators can switch perspective"));
        }

        let target = bounded(self.resolver.timeout(), "find_user", self.users.find_user(target_user_id))
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| AppError::not_found(format!("user {target_user_id}")))?;

        if !self.resolver.project_exists(project_id).await? {
            return Err(AppError::not_found(format!("project {project_id}")));
        }

        let access = self.resolver.member_access(project_id, target.id).await?;

        let identity = SimulatedIdentity {
            user: target,
            project_id,
            access,
            started_at: utc_now(),
            expires_at: real.expires_at,
        };

        let cache = self.resolver.cache();
        if let Some(previous) = self.sessions.set(real.session_id, identity.clone()).await {
            cache.invalidate_user(previous.user.id).await;
        }
        cache.invalidate_user(identity.user.id).await;

        tracing::info!(
            admin_id = %real.user.id,
            target_user_id = %identity.user.id,
            project_id = %project_id,
            "perspective switched"
        );

        let record = PerspectiveSwitch {
            session_id: real.session_id,
            admin_id: real.user.id,
            target_user_id: identity.user.id,
            project_id,
        };
        let actor = AuditActor {
            actor_id: real.user.id,
            on_behalf_of: Some(identity.user.id),
        };
        log_activity(&self.event_bus, "started", &actor, &record);

        Ok(identity)
    }

    /// Returns to the real view. Always allowed; a no-op when not simulating.
    pub async fn end(&self, real: &RealIdentity) -> Option<SimulatedIdentity> {
        self.end_session(real.session_id, real.user.id).await
    }

    pub async fn end_session(&self, session_id: Uuid, actor_id: Uuid) -> Option<SimulatedIdentity> {
        let previous = self.sessions.clear(session_id).await?;

        self.resolver.cache().invalidate_user(previous.user.id).await;

        tracing::info!(admin_id = %actor_id, target_user_id = %previous.user.id, "perspective reverted");

        let record = PerspectiveSwitch {
            session_id,
            admin_id: actor_id,
            target_user_id: previous.user.id,
            project_id: previous.project_id,
        };
        let actor = AuditActor {
            actor_id,
            on_behalf_of: Some(previous.user.id),
        };
        log_activity(&self.event_bus, "ended", &actor, &record);

        Some(previous)
    }
}
