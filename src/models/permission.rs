use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::{CapabilitySet, DisplayRole};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamQuery {
    /// Evaluate inside this team of the project.
    pub team_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionSummary {
    pub project_id: Uuid,
    pub team_id: Option<String>,
    pub user_id: Uuid,
    pub role: DisplayRole,
    pub capabilities: CapabilitySet,
    pub is_simulating: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheck {
    #[schema(example = "edit")]
    pub capability: String,
    pub allowed: bool,
}
