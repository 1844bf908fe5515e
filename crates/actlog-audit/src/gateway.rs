//! Dispatch of normalized records to the configured backend.

use std::sync::Arc;

use crate::backend::AuditBackend;
use crate::error::{AuditError, PersistenceError};
use crate::event::{CorsEvent, CrudEvent, EventKind, LoginEvent, RecordId, RequestEvent};

/// Hands each record to the backend exactly once and applies the
/// propagate-errors policy to the outcome.
///
/// With `propagate_errors` off a failed write is logged and reported as
/// `Ok(None)`; with it on the failure is returned to the trigger.
#[derive(Clone)]
pub struct Gateway {
    backend: Arc<dyn AuditBackend>,
    propagate_errors: bool,
}

impl Gateway {
    pub fn new(backend: Arc<dyn AuditBackend>, propagate_errors: bool) -> Self {
        Self {
            backend,
            propagate_errors,
        }
    }

    pub async fn login(&self, event: &LoginEvent) -> Result<Option<RecordId>, AuditError> {
        self.settle(EventKind::Login, self.backend.persist_login(event).await)
    }

    pub async fn crud(&self, event: &CrudEvent) -> Result<Option<RecordId>, AuditError> {
        self.settle(EventKind::Crud, self.backend.persist_crud(event).await)
    }

    pub async fn request(&self, event: &RequestEvent) -> Result<Option<RecordId>, AuditError> {
        self.settle(EventKind::Request, self.backend.persist_request(event).await)
    }

    pub async fn cors(&self, event: &CorsEvent) -> Result<Option<RecordId>, AuditError> {
        self.settle(EventKind::Cors, self.backend.persist_cors(event).await)
    }

    fn settle(
        &self,
        kind: EventKind,
        result: Result<RecordId, PersistenceError>,
    ) -> Result<Option<RecordId>, AuditError> {
        match result {
            Ok(id) => Ok(Some(id)),
            Err(e) if self.propagate_errors => Err(e.into()),
            Err(e) => {
                tracing::warn!(event_kind = %kind, error = %e, "Failed to persist audit event");
                Ok(None)
            }
        }
    }
}
