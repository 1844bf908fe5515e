use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use actlog_core::ActivityLogConfig;

/// Demo server configuration.
///
/// ```yaml
/// bind: "127.0.0.1:8080"
/// users:
///   - { id: "1", username: alice, password: wonderland }
/// actlog:
///   storage:
///     backend: console
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:8080"
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Accounts accepted by `/login`. Passwords are hashed at startup.
    #[serde(default = "default_users")]
    pub users: Vec<DemoUser>,

    /// Audit pipeline configuration.
    #[serde(default)]
    pub actlog: ActivityLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoUser {
    pub id: String,
    pub username: String,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            users: default_users(),
            actlog: ActivityLogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.actlog.validate()?;
        Ok(config)
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_users() -> Vec<DemoUser> {
    vec![DemoUser {
        id: "1".to_string(),
        username: "admin".to_string(),
        password: "admin".to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.users.len(), 1);
        assert!(config.actlog.watch.request_events);
    }

    #[test]
    fn test_nested_actlog_section() {
        let config = ServerConfig::from_yaml(
            r#"
bind: "127.0.0.1:9000"
users:
  - { id: "7", username: alice, password: wonderland }
actlog:
  propagate_errors: true
  storage:
    backend: memory
"#,
        )
        .unwrap();
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.users[0].username, "alice");
        assert!(config.actlog.propagate_errors);
        assert_eq!(config.actlog.storage.backend, "memory");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(ServerConfig::load(Some(Path::new("/nonexistent/actlog.yaml"))).is_err());
        assert!(ServerConfig::load(None).is_ok());
    }
}
