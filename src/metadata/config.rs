use serde::{Deserialize, Serialize};

/// Rule tying a child type's key to its parent's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum NamingPolicy {
    /// Child keys must be `parent + separator + suffix` with a non-empty suffix.
    /// An empty separator degrades to a plain textual prefix check.
    Prefix { separator: String },
    /// No constraint between parent and child keys.
    Unrestricted,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        NamingPolicy::Prefix {
            separator: "-".to_string(),
        }
    }
}

impl NamingPolicy {
    pub fn allows(&self, parent: &str, child: &str) -> bool {
        match self {
            NamingPolicy::Unrestricted => true,
            NamingPolicy::Prefix { separator } => child
                .strip_prefix(parent)
                .and_then(|rest| rest.strip_prefix(separator.as_str()))
                .is_some_and(|suffix| !suffix.is_empty()),
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub naming_policy: NamingPolicy,
}

impl RegistryConfig {
    pub fn unrestricted() -> Self {
        RegistryConfig {
            naming_policy: NamingPolicy::Unrestricted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_requires_dash_prefix() {
        let policy = NamingPolicy::default();
        assert!(policy.allows("vehicle", "vehicle-car"));
        assert!(!policy.allows("vehicle", "vehiclecar"));
        assert!(!policy.allows("vehicle", "vehicle-"));
        assert!(!policy.allows("vehicle", "car"));
    }

    #[test]
    fn empty_separator_is_plain_prefix() {
        let policy = NamingPolicy::Prefix {
            separator: String::new(),
        };
        assert!(policy.allows("vehicle", "vehiclecar"));
        assert!(!policy.allows("vehicle", "vehicle"));
    }

    #[test]
    fn unrestricted_allows_anything() {
        assert!(NamingPolicy::Unrestricted.allows("pet", "cat"));
    }

    #[test]
    fn deserializes_from_json() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"naming_policy": {"policy": "unrestricted"}}"#).unwrap();
        assert_eq!(config, RegistryConfig::unrestricted());

        let config: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.naming_policy, NamingPolicy::default());
    }
}
