use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the lifecycle status of a deployment.
pub const STATUS_FIELD: &str = "status";

/// Field carrying the compute status of a deployment, when the provider reports it.
pub const COMPUTE_STATUS_FIELD: &str = "computeStatus";

/// Kind of remote resource the engine can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Deployment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
        }
    }
}

/// Immutable snapshot of a resource as returned by the platform at fetch time.
///
/// The field set is provider-defined. Only `status` and `computeStatus` carry
/// meaning for change detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceState {
    fields: Map<String, Value>,
}

impl ResourceState {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a state from an arbitrary JSON payload.
    ///
    /// Returns `None` when the payload is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn status(&self) -> Option<&Value> {
        self.get(STATUS_FIELD)
    }

    pub fn compute_status(&self) -> Option<&Value> {
        self.get(COMPUTE_STATUS_FIELD)
    }

    /// Display name of the deployment, if the provider returned one.
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_requires_object() {
        assert!(ResourceState::from_value(json!({"status": "active"})).is_some());
        assert!(ResourceState::from_value(json!(["active"])).is_none());
        assert!(ResourceState::from_value(json!(null)).is_none());
    }

    #[test]
    fn test_field_accessors() {
        let state = ResourceState::from_value(json!({
            "status": "active",
            "computeStatus": "running",
            "name": "orders-db"
        }))
        .unwrap();

        assert_eq!(state.status(), Some(&json!("active")));
        assert_eq!(state.compute_status(), Some(&json!("running")));
        assert_eq!(state.name(), Some("orders-db"));
        assert_eq!(state.get("missing"), None);
    }

    #[test]
    fn test_serializes_transparently() {
        let state = ResourceState::from_value(json!({"status": "active"})).unwrap();
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({"status": "active"}));
    }
}
