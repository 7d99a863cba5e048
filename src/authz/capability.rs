use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The closed set of capabilities a user can hold on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    Edit,
    ManageMembers,
    ViewOtherTeams,
}

impl Capability {
    /// Unknown names yield `None`; callers must treat that as a denial.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "view" | "can_view" => Some(Capability::View),
            "edit" | "can_edit" => Some(Capability::Edit),
            "manage_members" | "can_manage_members" => Some(Capability::ManageMembers),
            "view_other_teams" | "can_view_other_teams" => Some(Capability::ViewOtherTeams),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Edit => "edit",
            Capability::ManageMembers => "manage_members",
            Capability::ViewOtherTeams => "view_other_teams",
        }
    }
}

/// Effective capabilities after resolution. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct CapabilitySet {
    pub view: bool,
    pub edit: bool,
    pub manage_members: bool,
    pub view_other_teams: bool,
}

impl CapabilitySet {
    pub const fn all() -> Self {
        Self {
            view: true,
            edit: true,
            manage_members: true,
            view_other_teams: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            view: false,
            edit: false,
            manage_members: false,
            view_other_teams: false,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => self.view,
            Capability::Edit => self.edit,
            Capability::ManageMembers => self.manage_members,
            Capability::ViewOtherTeams => self.view_other_teams,
        }
    }
}

/// Capability flags as persisted on a membership row. `None` means the row
/// does not decide that capability and the role default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct StoredCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_view: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_edit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_manage_members: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_view_other_teams: Option<bool>,
}

impl StoredCapabilities {
    pub fn is_empty(&self) -> bool {
        self.can_view.is_none()
            && self.can_edit.is_none()
            && self.can_manage_members.is_none()
            && self.can_view_other_teams.is_none()
    }

    /// Field-wise: keep our value where set, otherwise take `fallback`'s.
    pub fn or(self, fallback: StoredCapabilities) -> Self {
        Self {
            can_view: self.can_view.or(fallback.can_view),
            can_edit: self.can_edit.or(fallback.can_edit),
            can_manage_members: self.can_manage_members.or(fallback.can_manage_members),
            can_view_other_teams: self.can_view_other_teams.or(fallback.can_view_other_teams),
        }
    }

    /// True when any flag is explicitly set to `true` where `defaults` says
    /// `false`.
    pub fn grants_beyond(&self, defaults: CapabilitySet) -> bool {
        self.can_view == Some(true) && !defaults.view
            || self.can_edit == Some(true) && !defaults.edit
            || self.can_manage_members == Some(true) && !defaults.manage_members
            || self.can_view_other_teams == Some(true) && !defaults.view_other_teams
    }

    /// Explicit stored values win over `defaults`.
    pub fn over(self, defaults: CapabilitySet) -> CapabilitySet {
        CapabilitySet {
            view: self.can_view.unwrap_or(defaults.view),
            edit: self.can_edit.unwrap_or(defaults.edit),
            manage_members: self.can_manage_members.unwrap_or(defaults.manage_members),
            view_other_teams: self.can_view_other_teams.unwrap_or(defaults.view_other_teams),
        }
    }
}

impl From<CapabilitySet> for StoredCapabilities {
    fn from(set: CapabilitySet) -> Self {
        Self {
            can_view: Some(set.view),
            can_edit: Some(set.edit),
            can_manage_members: Some(set.manage_members),
            can_view_other_teams: Some(set.view_other_teams),
        }
    }
}
