use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{Role, StoredCapabilities};
use crate::events::{Loggable, Severity};

// =============================================================================
// MEMBERSHIP ROW
// =============================================================================

/// One persisted membership row. `team_id == None` is the project-wide row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectMembership {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub team_id: Option<String>,
    #[schema(value_type = String, example = "leader")]
    pub role: Role,
    #[serde(flatten)]
    pub capabilities: StoredCapabilities,
    pub is_active: bool,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for ProjectMembership {
    fn entity_type() -> &'static str { "membership" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Audit record of a soft removal; the rows themselves stay in the table.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipRemoval {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub rows_deactivated: u64,
}

impl Loggable for MembershipRemoval {
    fn entity_type() -> &'static str { "membership" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// The writable part of a membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipFields {
    pub role: Role,
    pub capabilities: StoredCapabilities,
}

impl MembershipFields {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            capabilities: StoredCapabilities::default(),
        }
    }

    /// A brand-new membership with every flag taken from the role default table.
    pub fn with_role_defaults(role: Role) -> Self {
        Self {
            role,
            capabilities: role.default_capabilities().into(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: StoredCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

// =============================================================================
// AGGREGATED ACCESS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TeamContext {
    pub team_id: String,
    #[schema(value_type = String, example = "leader")]
    pub role: Role,
    #[serde(flatten)]
    pub capabilities: StoredCapabilities,
}

/// Everything stored about one user's access to one project, folded from
/// their active membership rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MemberAccess {
    pub user_id: Uuid,
    #[schema(value_type = String, example = "member")]
    pub role: Role,
    pub team_contexts: Vec<TeamContext>,
    #[serde(flatten)]
    pub capabilities: StoredCapabilities,
}

impl MemberAccess {
    /// Folds active rows of a single user. The project-wide row supplies the
    /// base role and flags. Without one the base is the strongest team role
    /// capped at `Member`, and no flags are stored: leading a team grants
    /// nothing outside that team.
    pub fn from_rows(user_id: Uuid, rows: &[ProjectMembership]) -> Option<Self> {
        let active: Vec<&ProjectMembership> = rows
            .iter()
            .filter(|row| row.is_active && row.user_id == user_id)
            .collect();

        if active.is_empty() {
            return None;
        }

        let project_wide = active.iter().find(|row| row.team_id.is_none());

        let mut team_contexts: Vec<TeamContext> = active
            .iter()
            .filter_map(|row| {
                row.team_id.as_ref().map(|team_id| TeamContext {
                    team_id: team_id.clone(),
                    role: row.role,
                    capabilities: row.capabilities,
                })
            })
            .collect();
        team_contexts.sort_by(|a, b| a.team_id.cmp(&b.team_id));

        let (role, capabilities) = match project_wide {
            Some(row) => (row.role, row.capabilities),
            None => {
                let strongest = team_contexts
                    .iter()
                    .map(|ctx| ctx.role)
                    .max_by_key(Role::rank)
                    .unwrap_or(Role::Guest);
                let base = if strongest.rank() > Role::Member.rank() {
                    Role::Member
                } else {
                    strongest
                };
                (base, StoredCapabilities::default())
            }
        };

        Some(Self {
            user_id,
            role,
            team_contexts,
            capabilities,
        })
    }

    pub fn team(&self, team_id: &str) -> Option<&TeamContext> {
        self.team_contexts.iter().find(|ctx| ctx.team_id == team_id)
    }
}

// =============================================================================
// ROSTER
// =============================================================================

/// Active memberships of a project grouped for display. Pure projection of
/// the rows; not stored anywhere.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct MemberRoster {
    pub admins: Vec<ProjectMembership>,
    pub owners: Vec<ProjectMembership>,
    pub leaders: Vec<ProjectMembership>,
    pub members: Vec<ProjectMembership>,
    pub guests: Vec<ProjectMembership>,
    pub total: usize,
}

impl MemberRoster {
    pub fn group(rows: Vec<ProjectMembership>) -> Self {
        let mut roster = MemberRoster::default();
        for row in rows.into_iter().filter(|row| row.is_active) {
            roster.total += 1;
            match row.role {
                Role::SuperAdmin | Role::Admin => roster.admins.push(row),
                Role::Owner => roster.owners.push(row),
                Role::Leader => roster.leaders.push(row),
                Role::Member => roster.members.push(row),
                Role::Guest => roster.guests.push(row),
            }
        }
        roster
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertMembershipRequest {
    #[schema(example = "team_001")]
    pub team_id: Option<String>,
    #[schema(example = "foreman")]
    pub role: String,
    #[serde(flatten)]
    pub capabilities: StoredCapabilities,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[schema(example = "team_001")]
    pub team_id: Option<String>,
    #[schema(example = "worker")]
    pub role: String,
}
