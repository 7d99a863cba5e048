use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::DisplayRole;
use crate::events::{Loggable, Severity};
use crate::models::membership::MemberAccess;
use crate::models::user::User;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PerspectiveRequest {
    /// `null` returns to the real view.
    pub target_user_id: Option<Uuid>,
    pub project_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PerspectiveStatus {
    pub real_user_id: Uuid,
    pub is_real_admin: bool,
    pub is_simulating: bool,
    pub simulated_user: Option<User>,
    pub project_id: Option<Uuid>,
    pub role_in_project: Option<DisplayRole>,
    /// The simulated user's membership as loaded when the switch happened.
    pub membership: Option<MemberAccess>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Audit record of a perspective change.
#[derive(Debug, Clone, Serialize)]
pub struct PerspectiveSwitch {
    pub session_id: Uuid,
    pub admin_id: Uuid,
    pub target_user_id: Uuid,
    pub project_id: Uuid,
}

impl Loggable for PerspectiveSwitch {
    fn entity_type() -> &'static str { "perspective" }
    fn subject_id(&self) -> Uuid { self.target_user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}
