//! In-process backend.

use async_trait::async_trait;
use std::sync::RwLock;

use super::AuditBackend;
use crate::error::PersistenceError;
use crate::event::{
    AuditRecord, CorsEvent, CrudEvent, EventKind, LoginEvent, RecordId, RequestEvent,
};

/// Keeps every record in memory. Ids are assigned sequentially from 1.
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn records_of(&self, kind: EventKind) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.kind() == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }

    fn push(&self, record: AuditRecord) -> Result<RecordId, PersistenceError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| PersistenceError::Storage(format!("Failed to acquire write lock: {e}")))?;
        records.push(record);
        Ok(RecordId(records.len() as i64))
    }
}

#[async_trait]
impl AuditBackend for MemoryBackend {
    async fn persist_login(&self, event: &LoginEvent) -> Result<RecordId, PersistenceError> {
        self.push(AuditRecord::Login(event.clone()))
    }

    async fn persist_crud(&self, event: &CrudEvent) -> Result<RecordId, PersistenceError> {
        self.push(AuditRecord::Crud(event.clone()))
    }

    async fn persist_request(&self, event: &RequestEvent) -> Result<RecordId, PersistenceError> {
        self.push(AuditRecord::Request(event.clone()))
    }

    async fn persist_cors(&self, event: &CorsEvent) -> Result<RecordId, PersistenceError> {
        self.push(AuditRecord::Cors(event.clone()))
    }
}
