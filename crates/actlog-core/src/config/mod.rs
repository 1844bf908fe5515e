//! Configuration types for actlog.
//!
//! Configuration is read once from a YAML file at startup and never changes
//! afterwards. Every section has defaults, so an empty document is a valid
//! configuration that watches all four event kinds and writes to the default
//! SQLite database.
//!
//! ```yaml
//! watch:
//!   auth_events: true
//!   request_events: true
//! urls:
//!   deny_extra: ["^/healthz$"]
//! storage:
//!   backend: database
//!   alias: default
//!   databases:
//!     default:
//!       url: "sqlite://data/actlog.sqlite"
//! propagate_errors: false
//! ```

pub mod headers;
pub mod identity;
pub mod scope;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use headers::HeaderConfig;
pub use identity::{IdentityConfig, TokenConfig, TokenKind};
pub use scope::ScopeConfig;
pub use storage::{DatabaseConfig, StorageConfig};

/// Complete actlog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogConfig {
    /// Which event sources are active.
    #[serde(default)]
    pub watch: WatchConfig,

    /// Header names consulted for network origin and client hints.
    #[serde(default)]
    pub headers: HeaderConfig,

    /// Entity (model) allow/deny lists for CRUD events.
    #[serde(
        default = "ScopeConfig::default_entities",
        deserialize_with = "ScopeConfig::deserialize_entities"
    )]
    pub entities: ScopeConfig,

    /// URL allow/deny lists for request and CORS events.
    #[serde(
        default = "ScopeConfig::default_urls",
        deserialize_with = "ScopeConfig::deserialize_urls"
    )]
    pub urls: ScopeConfig,

    /// Persistence backend selection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential schemes used to recover the acting user.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Geolocation database.
    #[serde(default)]
    pub geoip: GeoIpConfig,

    /// Re-raise persistence failures to the triggering operation.
    ///
    /// Meant for test environments; in production audit failures stay invisible.
    #[serde(default)]
    pub propagate_errors: bool,

    /// Drop update events whose computed diff is empty.
    #[serde(default)]
    pub skip_unchanged_crud: bool,

    /// Names of diff callbacks (registered in code) invoked for every CRUD diff.
    #[serde(default)]
    pub crud_diff_callbacks: Vec<String>,
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            headers: HeaderConfig::default(),
            entities: ScopeConfig::default_entities(),
            urls: ScopeConfig::default_urls(),
            storage: StorageConfig::default(),
            identity: IdentityConfig::default(),
            geoip: GeoIpConfig::default(),
            propagate_errors: false,
            skip_unchanged_crud: false,
            crud_diff_callbacks: Vec::new(),
        }
    }
}

/// Per-source toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub auth_events: bool,

    #[serde(default = "default_true")]
    pub model_events: bool,

    #[serde(default = "default_true")]
    pub request_events: bool,

    #[serde(default = "default_true")]
    pub cors_events: bool,

    /// Record READ operations on tracked entities. Off by default: reads are noisy.
    #[serde(default)]
    pub read_events: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            auth_events: true,
            model_events: true,
            request_events: true,
            cors_events: true,
            read_events: false,
        }
    }
}

/// Geolocation database configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeoIpConfig {
    /// Path to a MaxMind City database (`.mmdb`). Unset disables geolocation.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ActivityLogConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not need the pipeline's registries.
    ///
    /// Pattern compilation and backend name resolution happen when the
    /// pipeline is built, and fail there.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.alias.trim().is_empty() {
            return Err(ConfigError::Config("storage.alias must not be empty".into()));
        }
        if self.storage.backend.trim().is_empty() {
            return Err(ConfigError::Config(
                "storage.backend must not be empty".into(),
            ));
        }
        if self.identity.session_cookie_name.trim().is_empty() {
            return Err(ConfigError::Config(
                "identity.session_cookie_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ActivityLogConfig::from_yaml("{}").unwrap();
        assert!(config.watch.auth_events);
        assert!(config.watch.cors_events);
        assert!(!config.watch.read_events);
        assert!(!config.propagate_errors);
        assert_eq!(config.storage.backend, "database");
        assert_eq!(config.storage.alias, "default");
        assert!(config.urls.deny.iter().any(|p| p == "^/admin/"));
    }

    #[test]
    fn parses_nested_sections() {
        let yaml = r#"
watch:
  request_events: false
  read_events: true
headers:
  remote_addr: x-real-ip
urls:
  allow: ["^/api/"]
  deny_extra: ["^/api/health"]
storage:
  backend: memory
propagate_errors: true
skip_unchanged_crud: true
crud_diff_callbacks: ["notify"]
"#;
        let config = ActivityLogConfig::from_yaml(yaml).unwrap();
        assert!(!config.watch.request_events);
        assert!(config.watch.read_events);
        assert_eq!(config.headers.remote_addr.as_deref(), Some("x-real-ip"));
        assert_eq!(config.urls.allow, vec!["^/api/".to_string()]);
        assert!(config.urls.effective_deny().contains(&"^/api/health".to_string()));
        assert!(config.urls.effective_deny().contains(&"^/static/".to_string()));
        assert_eq!(config.storage.backend, "memory");
        assert!(config.propagate_errors);
        assert!(config.skip_unchanged_crud);
        assert_eq!(config.crud_diff_callbacks, vec!["notify".to_string()]);
    }

    #[test]
    fn partial_entity_section_keeps_default_deny() {
        let yaml = "entities:\n  allow: [\"^shop\\\\.\"]\n";
        let config = ActivityLogConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.entities.allow, vec![r"^shop\.".to_string()]);
        let deny = config.entities.effective_deny();
        assert!(deny.contains(&r"^actlog\.".to_string()));
        assert!(deny.contains(&r"^sessions\.".to_string()));
    }

    #[test]
    fn deny_extra_alone_extends_url_defaults() {
        let yaml = "urls:\n  deny_extra: [\"^/healthz$\"]\n";
        let config = ActivityLogConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.urls.effective_deny(),
            vec![
                "^/admin/".to_string(),
                "^/static/".to_string(),
                "^/favicon.ico$".to_string(),
                "^/healthz$".to_string(),
            ]
        );
    }

    #[test]
    fn explicit_deny_replaces_defaults() {
        let config = ActivityLogConfig::from_yaml("urls:\n  deny: []\n").unwrap();
        assert!(config.urls.effective_deny().is_empty());
    }

    #[test]
    fn rejects_empty_alias() {
        let err = ActivityLogConfig::from_yaml("storage:\n  alias: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actlog.yaml");
        fs::write(&path, "watch:\n  cors_events: false\n").unwrap();

        let config = ActivityLogConfig::from_file(&path).unwrap();
        assert!(!config.watch.cors_events);
    }
}
