//! Error types for the audit crate.

use std::net::IpAddr;
use thiserror::Error;

/// Errors surfaced by the audit pipeline.
///
/// Only persistence failures (and only under the propagate-errors policy) and
/// startup configuration failures ever reach callers. Identity and enrichment
/// failures are recovered where they happen.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The backend could not store an event.
    #[error("failed to persist audit event: {0}")]
    Persistence(#[from] PersistenceError),

    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] actlog_core::ConfigError),
}

impl AuditError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Backend write failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Failure of a single credential scheme.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("malformed cookie header")]
    MalformedCookie,

    #[error("unknown session")]
    UnknownSession,

    #[error("session carries no authenticated user")]
    AnonymousSession,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("token missing subject claim: {0}")]
    MissingSubject(String),

    #[error("user {0} not found")]
    UnknownUser(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Geolocation lookup failure.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("no geolocation database configured")]
    NoDatabase,

    #[error("failed to open geolocation database: {0}")]
    Open(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("address {0} is not publicly routable")]
    NonRoutable(IpAddr),

    #[error("lookup failed: {0}")]
    Lookup(String),
}
