use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which observed field transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    StatusChanged,
    ComputeStatusChanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::StatusChanged => "status_changed",
            ChangeKind::ComputeStatusChanged => "compute_status_changed",
        }
    }

    /// Human-readable label for the field that changed.
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::StatusChanged => "status",
            ChangeKind::ComputeStatusChanged => "compute status",
        }
    }
}

/// A single detected transition of a watched resource.
///
/// `None` on either side means the field was absent in that snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub resource_id: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// RFC 3339 UTC
    pub timestamp: String,
}

impl ChangeEvent {
    /// One-line summary suitable for display to a human.
    pub fn summary(&self) -> String {
        format!(
            "Deployment {} {} changed: {} -> {}",
            self.resource_id,
            self.kind.label(),
            display_value(self.old_value.as_ref()),
            display_value(self.new_value.as_ref()),
        )
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None => "(absent)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
