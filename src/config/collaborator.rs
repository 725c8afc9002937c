//! Per-collaborator service configuration

use serde::{Deserialize, Serialize};

/// Configuration for a single collaborator service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CollaboratorConfig {
    /// Base URL of the service
    pub base_url: String,

    /// Bearer token, if the service requires one
    pub api_key: Option<String>,

    /// Model hint forwarded to generation requests
    pub model: Option<String>,

    /// Client-level timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    180
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            model: None,
            timeout: default_timeout(),
        }
    }
}

impl CollaboratorConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            base_url = "http://localhost:8001"
        "#;
        let config: CollaboratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.timeout, 180);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            base_url = "https://generator.internal/v1"
            api_key = "sk-test"
            model = "gemini-2.5-flash"
            timeout = 60
        "#;
        let config: CollaboratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.api_key, Some("sk-test".into()));
        assert_eq!(config.model, Some("gemini-2.5-flash".into()));
        assert_eq!(config.timeout, 60);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let toml = r#"
            base_url = "http://localhost:8001"
            unknown_field = "value"
        "#;
        let result: Result<CollaboratorConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
