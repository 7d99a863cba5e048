use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity logs. Controls retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Access changes: long-term retention, never auto-delete
    Critical,
    #[default]
    Important,
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can appear as the subject of an activity log entry.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. "membership" in "membership.removed"
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "removed" | "started" | "ended" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
