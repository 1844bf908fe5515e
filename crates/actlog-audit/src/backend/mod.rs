//! Persistence backends.
//!
//! A backend stores each record once and returns the id it assigned. The
//! process uses exactly one backend, chosen by name from a [`BackendRegistry`]
//! at startup and shared by every trigger.

pub mod console;
pub mod database;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use actlog_core::StorageConfig;

use crate::error::{AuditError, PersistenceError};
use crate::event::{CorsEvent, CrudEvent, LoginEvent, RecordId, RequestEvent};

pub use console::ConsoleBackend;
pub use database::DatabaseBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Trait for audit persistence backends.
///
/// Each call is its own unit of work: it either stores the record completely
/// or fails without side effects.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    async fn persist_login(&self, event: &LoginEvent) -> Result<RecordId, PersistenceError>;

    async fn persist_crud(&self, event: &CrudEvent) -> Result<RecordId, PersistenceError>;

    async fn persist_request(&self, event: &RequestEvent) -> Result<RecordId, PersistenceError>;

    async fn persist_cors(&self, event: &CorsEvent) -> Result<RecordId, PersistenceError>;
}

/// Builds a backend from the storage configuration.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(&self, config: &StorageConfig) -> Result<Arc<dyn AuditBackend>, AuditError>;
}

/// Backend factories by name.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `database`, `memory`, `console` and `file`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("database", DatabaseFactory);
        registry.register("memory", MemoryFactory);
        registry.register("console", ConsoleFactory);
        registry.register("file", FileFactory);
        registry
    }

    /// Register `factory` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, factory: impl BackendFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the backend named in `config`.
    pub async fn create(
        &self,
        config: &StorageConfig,
    ) -> Result<Arc<dyn AuditBackend>, AuditError> {
        let factory = self.factories.get(&config.backend).ok_or_else(|| {
            let known: Vec<&str> = self.names().collect();
            AuditError::configuration(format!(
                "unknown audit backend '{}' (registered: {})",
                config.backend,
                known.join(", ")
            ))
        })?;

        let backend = factory.create(config).await?;
        tracing::info!(backend = %config.backend, "Audit backend ready");
        Ok(backend)
    }
}

struct DatabaseFactory;

#[async_trait]
impl BackendFactory for DatabaseFactory {
    async fn create(&self, config: &StorageConfig) -> Result<Arc<dyn AuditBackend>, AuditError> {
        Ok(Arc::new(DatabaseBackend::connect(config).await?))
    }
}

struct MemoryFactory;

#[async_trait]
impl BackendFactory for MemoryFactory {
    async fn create(&self, _config: &StorageConfig) -> Result<Arc<dyn AuditBackend>, AuditError> {
        Ok(Arc::new(MemoryBackend::new()))
    }
}

struct ConsoleFactory;

#[async_trait]
impl BackendFactory for ConsoleFactory {
    async fn create(&self, _config: &StorageConfig) -> Result<Arc<dyn AuditBackend>, AuditError> {
        Ok(Arc::new(ConsoleBackend::new()))
    }
}

struct FileFactory;

#[async_trait]
impl BackendFactory for FileFactory {
    async fn create(&self, config: &StorageConfig) -> Result<Arc<dyn AuditBackend>, AuditError> {
        let path = config.file_path.as_deref().unwrap_or("actlog.jsonl");
        Ok(Arc::new(FileBackend::new(path)))
    }
}
