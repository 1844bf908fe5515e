//! Stdout backend.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

use super::AuditBackend;
use crate::error::PersistenceError;
use crate::event::{AuditRecord, CorsEvent, CrudEvent, LoginEvent, RecordId, RequestEvent};

/// Prints each record as one JSON line on stdout.
#[derive(Default)]
pub struct ConsoleBackend {
    next_id: AtomicI64,
}

impl ConsoleBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn print(&self, record: AuditRecord) -> Result<RecordId, PersistenceError> {
        let json = serde_json::to_string(&record)?;
        println!("{}", json);
        Ok(RecordId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[async_trait]
impl AuditBackend for ConsoleBackend {
    async fn persist_login(&self, event: &LoginEvent) -> Result<RecordId, PersistenceError> {
        self.print(AuditRecord::Login(event.clone()))
    }

    async fn persist_crud(&self, event: &CrudEvent) -> Result<RecordId, PersistenceError> {
        self.print(AuditRecord::Crud(event.clone()))
    }

    async fn persist_request(&self, event: &RequestEvent) -> Result<RecordId, PersistenceError> {
        self.print(AuditRecord::Request(event.clone()))
    }

    async fn persist_cors(&self, event: &CorsEvent) -> Result<RecordId, PersistenceError> {
        self.print(AuditRecord::Cors(event.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Actor, LoginType, monotonic_now};
    use crate::normalize::login_event;

    #[tokio::test]
    async fn test_console_backend() {
        let backend = ConsoleBackend::new();
        let event = login_event(
            monotonic_now(),
            LoginType::Logout,
            Actor::anonymous(),
            Default::default(),
        );

        assert_eq!(backend.persist_login(&event).await.unwrap(), RecordId(1));
        assert_eq!(backend.persist_login(&event).await.unwrap(), RecordId(2));
    }
}
