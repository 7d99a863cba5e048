use std::fmt;

use serde::{Deserialize, Serialize};

use super::capability::CapabilitySet;

/// The single role vocabulary used everywhere: global roles on users,
/// membership roles on projects and team roles inside a membership.
///
/// Upstream sources spell these inconsistently (`foreman` vs `leader`,
/// `worker` vs `member`, missing values); [`Role::normalize`] is the only
/// place where raw strings become a `Role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Role {
    SuperAdmin,
    Admin,
    Owner,
    Leader,
    Member,
    Guest,
}

impl Role {
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "super_admin" | "superadmin" | "super-admin" => Role::SuperAdmin,
            "admin" => Role::Admin,
            "owner" => Role::Owner,
            "leader" | "foreman" => Role::Leader,
            "member" | "worker" => Role::Member,
            _ => Role::Guest,
        }
    }

    /// Global roles treat an unset value as an ordinary worker.
    pub fn from_global(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Role::Member,
            Some(value) => Role::normalize(value),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Leader => "leader",
            Role::Member => "member",
            Role::Guest => "guest",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Higher wins when several rows disagree.
    pub fn rank(&self) -> u8 {
        match self {
            Role::SuperAdmin => 5,
            Role::Admin => 4,
            Role::Owner => 3,
            Role::Leader => 2,
            Role::Member => 1,
            Role::Guest => 0,
        }
    }

    /// Role default table, consulted for every capability a membership
    /// does not store explicitly.
    pub fn default_capabilities(&self) -> CapabilitySet {
        match self {
            Role::SuperAdmin | Role::Admin => CapabilitySet::all(),
            Role::Owner => CapabilitySet {
                view: true,
                edit: false,
                manage_members: false,
                view_other_teams: true,
            },
            Role::Leader => CapabilitySet {
                view: true,
                edit: true,
                manage_members: true,
                view_other_teams: false,
            },
            Role::Member => CapabilitySet {
                view: true,
                edit: true,
                manage_members: false,
                view_other_teams: false,
            },
            Role::Guest => CapabilitySet::none(),
        }
    }

    pub fn display(&self) -> DisplayRole {
        match self {
            Role::SuperAdmin | Role::Admin => DisplayRole::Admin,
            Role::Owner => DisplayRole::Owner,
            Role::Leader => DisplayRole::Foreman,
            Role::Member => DisplayRole::Worker,
            Role::Guest => DisplayRole::Guest,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::normalize(&value)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role names as shown to site crews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayRole {
    Admin,
    Owner,
    Foreman,
    Worker,
    Guest,
}
