//! # actlog-audit
//!
//! Audit event capture for applications.
//!
//! This crate provides functionality for:
//! - Recording authentication, data-mutation, request and cross-origin events
//! - Filtering events through ordered allow/deny pattern lists
//! - Recovering the acting user from a session cookie or a bearer token
//! - Enriching events with client hints and best-effort geolocation
//! - Persisting each event exactly once through a pluggable backend
//!
//! ## Event Kinds
//!
//! | Kind | Trigger | Record |
//! |------|---------|--------|
//! | `LOGIN` | login succeeded / failed, logout | [`LoginEvent`] |
//! | `CRUD` | create / update / delete (/ read) on a tracked entity | [`CrudEvent`] |
//! | `REQUEST` | inbound request finished | [`RequestEvent`] |
//! | `CORS` | frontend-originated request started | [`CorsEvent`] |
//!
//! ## Ambient Context
//!
//! Triggers never take the request as a parameter. The HTTP layer opens a
//! task-local scope with [`context::scope`] and everything running inside it
//! (login handlers, repository code issuing mutations) finds the request
//! through [`context::current`].
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use actlog_audit::{Auditor, ModelChange, context::{self, RequestContext}};
//! use actlog_core::{ActivityLogConfig, Principal};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let auditor = Auditor::builder(ActivityLogConfig::default()).build().await?;
//!
//! let ctx = RequestContext::new("POST", "/login");
//! context::scope(ctx, async {
//!     auditor.login_succeeded(&Principal::new("1", "alice")).await?;
//!     auditor
//!         .model_changed(ModelChange::created(
//!             "shop.item",
//!             "7",
//!             "Item #7",
//!             json!({"name": "pen"}),
//!         ))
//!         .await?;
//!     Ok::<_, actlog_audit::AuditError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod auditor;
pub mod backend;
pub mod context;
pub mod enrich;
pub mod error;
pub mod event;
pub mod gateway;
pub mod identity;
pub mod normalize;
pub mod scope;

pub use auditor::{Auditor, AuditorBuilder, DiffCallback, ModelChange};
pub use backend::{AuditBackend, BackendFactory, BackendRegistry};
pub use error::{AuditError, EnrichmentError, IdentityError, PersistenceError};
pub use event::{
    Actor, AuditRecord, ClientDescriptor, CorsEvent, CrudEvent, CrudOperation, EventKind,
    EventOrigin, GeoLocation, LoginEvent, LoginType, RecordId, RequestEvent,
};
pub use gateway::Gateway;
pub use scope::ScopeFilter;
