use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Composite `(type, id)` identity of a record across the whole schema.
///
/// Serialises as `{"type": ..., "id": ...}`, the shape relationship references take inside
/// record property maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    #[serde(rename = "type")]
    pub type_key: String,
    pub id: String,
}

impl ModelKey {
    pub fn new(type_key: impl Into<String>, id: impl Into<String>) -> Self {
        ModelKey {
            type_key: type_key.into(),
            id: id.into(),
        }
    }

    /// Read a reference out of a property value. Anything that is not a `{type, id}` object
    /// yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let type_key = object.get("type")?.as_str()?;
        let id = match object.get("id")? {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        Some(ModelKey::new(type_key, id))
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "type": self.type_key, "id": self.id })
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_key, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_references() {
        assert_eq!(
            ModelKey::from_value(&json!({"type": "cat", "id": "1"})),
            Some(ModelKey::new("cat", "1"))
        );
        assert_eq!(
            ModelKey::from_value(&json!({"type": "cat", "id": 7})),
            Some(ModelKey::new("cat", "7"))
        );
        assert_eq!(ModelKey::from_value(&json!("cat:1")), None);
        assert_eq!(ModelKey::from_value(&json!({"id": "1"})), None);
    }

    #[test]
    fn display_and_value() {
        let key = ModelKey::new("widget", "5");
        assert_eq!(key.to_string(), "widget:5");
        assert_eq!(ModelKey::from_value(&key.to_value()), Some(key));
    }
}
