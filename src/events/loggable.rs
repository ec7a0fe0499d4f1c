use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Never trimmed. Permission changes land here.
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

/// Entities that can be recorded in the audit trail.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of the event name, e.g. `document_permission` in
    /// `document_permission.granted`.
    fn entity_type(&self) -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "revoked" | "deleted" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
