//! Persistence backend configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Backend selection and the databases it may write to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Registered backend name: "database", "memory", "console", "file",
    /// or any name registered by the host application.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database alias the database backend writes to.
    #[serde(default = "default_alias")]
    pub alias: String,

    /// Databases by alias.
    #[serde(default = "default_databases")]
    pub databases: HashMap<String, DatabaseConfig>,

    /// Output path for the file backend.
    #[serde(default)]
    pub file_path: Option<String>,
}

/// A single database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            alias: default_alias(),
            databases: default_databases(),
            file_path: None,
        }
    }
}

impl StorageConfig {
    /// The database registered under the configured alias, if any.
    pub fn selected_database(&self) -> Option<&DatabaseConfig> {
        self.databases.get(&self.alias)
    }
}

fn default_backend() -> String {
    "database".to_string()
}

fn default_alias() -> String {
    "default".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_databases() -> HashMap<String, DatabaseConfig> {
    let mut databases = HashMap::new();
    databases.insert(
        default_alias(),
        DatabaseConfig {
            url: "sqlite://data/actlog.sqlite?mode=rwc".to_string(),
            max_connections: default_max_connections(),
        },
    );
    databases
}
