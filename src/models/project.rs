use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{CapabilitySet, DisplayRole};
use crate::events::{Loggable, Severity};

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// CRM opportunity this project was opened from.
    pub opportunity_id: Option<String>,
    #[schema(example = "active")]
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Project {
    fn entity_type() -> &'static str { "project" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Important }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    #[schema(example = "Taipei Tower A")]
    pub name: String,
    #[schema(example = "opp_001")]
    pub opportunity_id: Option<String>,
}

/// A project as seen by the current context user.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectWithAccess {
    #[serde(flatten)]
    pub project: Project,
    pub role: DisplayRole,
    pub capabilities: CapabilitySet,
}
