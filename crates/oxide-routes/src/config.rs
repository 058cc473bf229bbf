//! Router configuration.

use serde::Deserialize;

use crate::error::Result;

/// Options that shape how route sources and targets are compiled.
///
/// ```
/// use oxide_routes::RouterConfig;
///
/// let config = RouterConfig::from_json_str(r#"{"sensitive": true}"#).unwrap();
/// assert!(config.sensitive);
/// assert!(!config.strict);
/// assert_eq!(config.controller_suffix, "Controller");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Match paths case-sensitively.
    pub sensitive: bool,
    /// Treat a trailing delimiter as significant.
    pub strict: bool,
    /// Suffix stripped from terminal route target names.
    pub controller_suffix: String,
    /// Suffix stripped from policy route target names.
    pub policy_suffix: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            sensitive: false,
            strict: false,
            controller_suffix: "Controller".to_string(),
            policy_suffix: "Policy".to_string(),
        }
    }
}

impl RouterConfig {
    /// Parses a configuration from JSON text. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses a configuration from an already decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = RouterConfig::from_value(serde_json::json!({
            "strict": true,
            "policy_suffix": "Guard"
        }))
        .unwrap();
        assert!(config.strict);
        assert_eq!(config.policy_suffix, "Guard");
        assert_eq!(config.controller_suffix, "Controller");
    }

    #[test]
    fn test_malformed_json() {
        assert!(RouterConfig::from_json_str("{strict: yes}").is_err());
    }
}
