use serde::{Deserialize, Serialize};

// Configuration types shared across all actlog crates
pub mod config;

pub use config::{
    ActivityLogConfig, ConfigError, DatabaseConfig, GeoIpConfig, HeaderConfig, IdentityConfig,
    ScopeConfig, StorageConfig, TokenConfig, TokenKind, WatchConfig,
};

/// An authenticated identity attached to an audit event.
///
/// The username is denormalized into every record so the trail stays readable
/// after the user itself is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}
