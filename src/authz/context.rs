use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::capability::{Capability, CapabilitySet};
use super::identity::{RealIdentity, SessionEvidence};
use super::perspective::{PerspectiveController, SimulatedIdentity};
use super::resolver::{EvaluationSubject, PermissionResolver};
use super::role::{DisplayRole, Role};
use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::AuditActor;
use crate::models::user::User;

/// Per-request view of who is calling and who they are acting as.
///
/// Capability questions are answered for the context user (the simulated
/// identity while impersonating). Admin gating always looks at the real user.
pub struct PermissionContext {
    real: RealIdentity,
    simulated: Option<SimulatedIdentity>,
    resolver: Arc<PermissionResolver>,
    perspectives: PerspectiveController,
}

#[async_trait]
impl FromRequestParts<AppState> for PermissionContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let evidence = SessionEvidence::from_headers(&parts.headers);
        let real = state.identity.resolve_real_user(&evidence).await?;

        let mut simulated = state.perspectives.current(real.session_id).await;
        if simulated.is_some() && !real.is_admin() {
            // admin rights were revoked mid-simulation
            tracing::warn!(user_id = %real.user.id, "dropping simulation of a non-admin session");
            state.perspectives.end_session(real.session_id, real.user.id).await;
            simulated = None;
        }

        Ok(Self {
            real,
            simulated,
            resolver: state.resolver.clone(),
            perspectives: state.perspectives.clone(),
        })
    }
}

impl PermissionContext {
    pub fn real_user(&self) -> &User {
        &self.real.user
    }

    pub fn session_id(&self) -> Uuid {
        self.real.session_id
    }

    pub fn current_context_user(&self) -> &User {
        self.simulated.as_ref().map(|sim| &sim.user).unwrap_or(&self.real.user)
    }

    pub fn is_real_admin(&self) -> bool {
        self.real.is_admin()
    }

    pub fn is_simulating(&self) -> bool {
        self.simulated.is_some()
    }

    pub fn simulated(&self) -> Option<&SimulatedIdentity> {
        self.simulated.as_ref()
    }

    /// Admin powers are in effect only for a real admin viewing as themselves.
    pub fn is_context_admin(&self) -> bool {
        self.is_real_admin() && !self.is_simulating()
    }

    fn subject(&self) -> EvaluationSubject<'_> {
        match &self.simulated {
            Some(sim) => EvaluationSubject::simulated(&sim.user),
            None => EvaluationSubject::real(&self.real.user),
        }
    }

    /// `Some(target)` starts or retargets a simulation, `None` returns to the
    /// real view. Returns whether a simulation is active afterwards.
    pub async fn switch_perspective(&mut self, target_user_id: Option<Uuid>, project_id: Uuid) -> AppResult<bool> {
        match target_user_id {
            Some(target) if target == self.real.user.id => {
                self.perspectives.end(&self.real).await;
                self.simulated = None;
            }
            Some(target) => {
                let sim = self.perspectives.begin(&self.real, target, project_id).await?;
                self.simulated = Some(sim);
            }
            None => {
                self.perspectives.end(&self.real).await;
                self.simulated = None;
            }
        }
        Ok(self.simulated.is_some())
    }

    /// Logout: impersonation never outlives the session that started it.
    pub async fn end_session(&mut self) {
        self.perspectives.end_session(self.real.session_id, self.real.user.id).await;
        self.simulated = None;
    }

    pub async fn effective_capabilities(&self, project_id: Uuid, team_id: Option<&str>) -> AppResult<CapabilitySet> {
        self.resolver.effective_capabilities(self.subject(), project_id, team_id).await
    }

    pub async fn has_permission(&self, project_id: Uuid, team_id: Option<&str>, capability: &str) -> bool {
        self.resolver.has_permission(self.subject(), project_id, team_id, capability).await
    }

    pub async fn role_in_team(&self, project_id: Uuid, team_id: Option<&str>) -> Role {
        self.resolver.role_in_team(self.subject(), project_id, team_id).await
    }

    pub async fn user_role_in_team(&self, project_id: Uuid, team_id: Option<&str>) -> DisplayRole {
        self.role_in_team(project_id, team_id).await.display()
    }

    /// Errors with `Forbidden` unless the context user holds `capability`.
    /// Unknown projects stay `NotFound` and store failures keep their own
    /// status; neither is ever an allow.
    pub async fn require(&self, project_id: Uuid, team_id: Option<&str>, capability: Capability) -> AppResult<CapabilitySet> {
        let caps = self.effective_capabilities(project_id, team_id).await?;
        if caps.allows(capability) {
            return Ok(caps);
        }

        tracing::debug!(
            user_id = %self.current_context_user().id,
            project_id = %project_id,
            capability = %capability.as_str(),
            "permission denied"
        );
        Err(AppError::forbidden(format!("missing '{}' on project {project_id}", capability.as_str())))
    }

    pub fn require_context_admin(&self) -> AppResult<()> {
        if self.is_context_admin() {
            return Ok(());
        }
        Err(AppError::forbidden("administrator access required"))
    }

    /// Audit attribution: the real user acts, on behalf of the simulated one.
    pub fn actor(&self) -> AuditActor {
        AuditActor {
            actor_id: self.real.user.id,
            on_behalf_of: self.simulated.as_ref().map(|sim| sim.user.id),
        }
    }
}
