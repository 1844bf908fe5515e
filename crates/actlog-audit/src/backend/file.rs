//! JSON lines file backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::AuditBackend;
use crate::error::PersistenceError;
use crate::event::{AuditRecord, CorsEvent, CrudEvent, LoginEvent, RecordId, RequestEvent};

/// Appends each record as one JSON line. The record id is its line number.
pub struct FileBackend {
    path: PathBuf,
    /// Lines written so far; `None` until the existing file has been counted.
    lines: Mutex<Option<i64>>,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lines: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: AuditRecord) -> Result<RecordId, PersistenceError> {
        let mut json = serde_json::to_string(&record)?;
        json.push('\n');

        // Held across the write so concurrent appends never interleave.
        let mut lines = self.lines.lock().await;
        let written = match *lines {
            Some(n) => n,
            None => self.existing_lines().await?,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;

        *lines = Some(written + 1);
        Ok(RecordId(written + 1))
    }

    async fn existing_lines(&self) -> Result<i64, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents.lines().count() as i64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AuditBackend for FileBackend {
    async fn persist_login(&self, event: &LoginEvent) -> Result<RecordId, PersistenceError> {
        self.append(AuditRecord::Login(event.clone())).await
    }

    async fn persist_crud(&self, event: &CrudEvent) -> Result<RecordId, PersistenceError> {
        self.append(AuditRecord::Crud(event.clone())).await
    }

    async fn persist_request(&self, event: &RequestEvent) -> Result<RecordId, PersistenceError> {
        self.append(AuditRecord::Request(event.clone())).await
    }

    async fn persist_cors(&self, event: &CorsEvent) -> Result<RecordId, PersistenceError> {
        self.append(AuditRecord::Cors(event.clone())).await
    }
}
