//! Event source triggers.
//!
//! [`Auditor`] is the single entry point applications call. Every trigger runs
//! the same pipeline inline on the caller's task:
//!
//! ```text
//! watch flag -> scope filter -> identity + enrichment -> normalize -> gateway
//! ```
//!
//! Request details come from the ambient [`context`](crate::context); nothing
//! request-specific is passed in.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use actlog_core::{ActivityLogConfig, HeaderConfig, Principal, WatchConfig};

use crate::backend::{AuditBackend, BackendRegistry};
use crate::context::{self, RequestContext};
use crate::enrich::{Enricher, GeoLocator, locator_from_config};
use crate::error::AuditError;
use crate::event::{Actor, CrudOperation, LoginType, RecordId, field_diff, monotonic_now};
use crate::gateway::Gateway;
use crate::identity::token::decoder_from_config;
use crate::identity::{IdentityResolver, MemoryUserStore, SessionStore, TokenDecoder, UserStore};
use crate::normalize::{self, CrudSource};
use crate::scope::ScopeFilter;

/// Receives the field diff of every audited update.
///
/// Callbacks are registered in code under a name and enabled from
/// configuration. A failing callback is logged and does not affect the event.
pub trait DiffCallback: Send + Sync {
    fn on_diff(&self, change: &ModelChange, diff: &Map<String, Value>) -> anyhow::Result<()>;
}

impl<F> DiffCallback for F
where
    F: Fn(&ModelChange, &Map<String, Value>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_diff(&self, change: &ModelChange, diff: &Map<String, Value>) -> anyhow::Result<()> {
        self(change, diff)
    }
}

/// A write (or read) on a tracked entity, as reported by the data layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChange {
    pub operation: CrudOperation,
    /// Qualified entity type, e.g. `shop.item`.
    pub entity_type: String,
    pub entity_id: String,
    pub object_repr: String,
    /// State before the operation (updates and deletes).
    pub before: Option<Value>,
    /// State after the operation (creates, updates and reads).
    pub after: Option<Value>,
    /// Acting user when known to the caller; resolved from the request otherwise.
    pub performed_by: Option<Principal>,
}

impl ModelChange {
    fn new(
        operation: CrudOperation,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        object_repr: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            object_repr: object_repr.into(),
            before: None,
            after: None,
            performed_by: None,
        }
    }

    pub fn created(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        object_repr: impl Into<String>,
        after: Value,
    ) -> Self {
        Self {
            after: Some(after),
            ..Self::new(CrudOperation::Create, entity_type, entity_id, object_repr)
        }
    }

    pub fn updated(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        object_repr: impl Into<String>,
        before: Value,
        after: Value,
    ) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
            ..Self::new(CrudOperation::Update, entity_type, entity_id, object_repr)
        }
    }

    pub fn deleted(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        object_repr: impl Into<String>,
        before: Value,
    ) -> Self {
        Self {
            before: Some(before),
            ..Self::new(CrudOperation::Delete, entity_type, entity_id, object_repr)
        }
    }

    pub fn read(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        object_repr: impl Into<String>,
        snapshot: Value,
    ) -> Self {
        Self {
            after: Some(snapshot),
            ..Self::new(CrudOperation::Read, entity_type, entity_id, object_repr)
        }
    }

    pub fn performed_by(mut self, principal: Principal) -> Self {
        self.performed_by = Some(principal);
        self
    }

    /// Object snapshot stored with the record: the prior state for deletes,
    /// the resulting state otherwise.
    pub fn snapshot(&self) -> &Value {
        let value = match self.operation {
            CrudOperation::Delete => self.before.as_ref().or(self.after.as_ref()),
            _ => self.after.as_ref().or(self.before.as_ref()),
        };
        value.unwrap_or(&Value::Null)
    }

    /// Changed fields; only updates have a diff.
    pub fn diff(&self) -> Option<Map<String, Value>> {
        if self.operation != CrudOperation::Update {
            return None;
        }
        let before = self.before.as_ref().unwrap_or(&Value::Null);
        let after = self.after.as_ref().unwrap_or(&Value::Null);
        Some(field_diff(before, after))
    }
}

/// The audit pipeline shared by every trigger.
pub struct Auditor {
    watch: WatchConfig,
    headers: HeaderConfig,
    entities: ScopeFilter,
    urls: ScopeFilter,
    skip_unchanged_crud: bool,
    identity: IdentityResolver,
    enricher: Enricher,
    gateway: Gateway,
    diff_callbacks: Vec<(String, Arc<dyn DiffCallback>)>,
}

impl Auditor {
    pub fn builder(config: ActivityLogConfig) -> AuditorBuilder {
        AuditorBuilder::new(config)
    }

    /// A user authenticated successfully.
    pub async fn login_succeeded(
        &self,
        principal: &Principal,
    ) -> Result<Option<RecordId>, AuditError> {
        self.auth_event(LoginType::Login, Actor::from(principal)).await
    }

    /// An authentication attempt failed. `username` is the name that was tried.
    pub async fn login_failed(
        &self,
        username: Option<&str>,
    ) -> Result<Option<RecordId>, AuditError> {
        let actor = username.map(Actor::username_only).unwrap_or_default();
        self.auth_event(LoginType::Failed, actor).await
    }

    /// A user logged out.
    pub async fn logged_out(&self, principal: &Principal) -> Result<Option<RecordId>, AuditError> {
        self.auth_event(LoginType::Logout, Actor::from(principal)).await
    }

    async fn auth_event(
        &self,
        login_type: LoginType,
        actor: Actor,
    ) -> Result<Option<RecordId>, AuditError> {
        if !self.watch.auth_events {
            return Ok(None);
        }
        let ctx = context::current();
        let origin = self.enricher.origin(ctx.as_deref());
        let event = normalize::login_event(monotonic_now(), login_type, actor, origin);
        self.gateway.login(&event).await
    }

    /// A tracked entity was created, updated, deleted or read.
    pub async fn model_changed(&self, change: ModelChange) -> Result<Option<RecordId>, AuditError> {
        if !self.watch.model_events {
            return Ok(None);
        }
        if change.operation == CrudOperation::Read && !self.watch.read_events {
            return Ok(None);
        }
        if !self.entities.is_in_scope(&change.entity_type) {
            tracing::trace!(entity = %change.entity_type, "entity out of audit scope");
            return Ok(None);
        }

        let diff = change.diff();
        if let Some(diff) = &diff {
            self.run_diff_callbacks(&change, diff);
            if diff.is_empty() && self.skip_unchanged_crud {
                tracing::debug!(
                    entity = %change.entity_type,
                    id = %change.entity_id,
                    "update without changes skipped"
                );
                return Ok(None);
            }
        }

        let ctx = context::current();
        let actor = match &change.performed_by {
            Some(principal) => Actor::from(principal),
            None => self.actor_for(ctx.as_deref()).await,
        };
        let origin = self.enricher.origin(ctx.as_deref());
        let source = CrudSource {
            operation: change.operation,
            entity_type: &change.entity_type,
            entity_id: &change.entity_id,
            object_repr: &change.object_repr,
            snapshot: change.snapshot(),
        };
        let event = normalize::crud_event(monotonic_now(), source, diff, actor, origin);
        self.gateway.crud(&event).await
    }

    /// The current request has been handled.
    pub async fn request_finished(&self) -> Result<Option<RecordId>, AuditError> {
        if !self.watch.request_events {
            return Ok(None);
        }
        let Some(current) = context::current() else {
            return Ok(None);
        };
        let ctx = current.as_ref();
        if !self.urls.is_in_scope(&ctx.path) {
            return Ok(None);
        }

        let actor = self.actor_for(Some(ctx)).await;
        let origin = self.enricher.origin(Some(ctx));
        let event = normalize::request_event(monotonic_now(), ctx, actor, origin);
        self.gateway.request(&event).await
    }

    /// The current request has started. Records a CORS event when the
    /// request carries the frontend URL header.
    pub async fn request_started(&self) -> Result<Option<RecordId>, AuditError> {
        if !self.watch.cors_events {
            return Ok(None);
        }
        let Some(current) = context::current() else {
            return Ok(None);
        };
        let ctx = current.as_ref();
        let Some(frontend_url) = ctx.headers.get_non_empty(&self.headers.frontend_url) else {
            return Ok(None);
        };
        if !self.urls.is_in_scope(&ctx.path) || !self.urls.is_in_scope(frontend_url) {
            return Ok(None);
        }

        let frontend_method = ctx.headers.get_non_empty(&self.headers.frontend_method);
        let actor = self.actor_for(Some(ctx)).await;
        let origin = self.enricher.origin(Some(ctx));
        let event = normalize::cors_event(
            monotonic_now(),
            ctx,
            frontend_url,
            frontend_method,
            actor,
            origin,
        );
        self.gateway.cors(&event).await
    }

    async fn actor_for(&self, ctx: Option<&RequestContext>) -> Actor {
        match ctx {
            Some(RequestContext {
                principal: Some(principal),
                ..
            }) => Actor::from(Some(principal)),
            Some(ctx) => Actor::from(self.identity.resolve(ctx).await.as_ref()),
            None => Actor::anonymous(),
        }
    }

    fn run_diff_callbacks(&self, change: &ModelChange, diff: &Map<String, Value>) {
        for (name, callback) in &self.diff_callbacks {
            if let Err(e) = callback.on_diff(change, diff) {
                tracing::warn!(
                    callback = %name,
                    entity = %change.entity_type,
                    error = %e,
                    "Diff callback failed"
                );
            }
        }
    }
}

/// Assembles an [`Auditor`] from configuration and the collaborators the
/// host application provides.
pub struct AuditorBuilder {
    config: ActivityLogConfig,
    users: Option<Arc<dyn UserStore>>,
    sessions: Option<Arc<dyn SessionStore>>,
    decoder: Option<Arc<dyn TokenDecoder>>,
    locator: Option<Arc<dyn GeoLocator>>,
    backend: Option<Arc<dyn AuditBackend>>,
    registry: BackendRegistry,
    callbacks: HashMap<String, Arc<dyn DiffCallback>>,
}

impl AuditorBuilder {
    pub fn new(config: ActivityLogConfig) -> Self {
        Self {
            config,
            users: None,
            sessions: None,
            decoder: None,
            locator: None,
            backend: None,
            registry: BackendRegistry::with_builtins(),
            callbacks: HashMap::new(),
        }
    }

    pub fn with_users(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Use `decoder` instead of the one selected by `identity.token`.
    pub fn with_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Use `locator` instead of the database named by `geoip`.
    pub fn with_locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Use `backend` directly, bypassing the registry.
    pub fn with_backend(mut self, backend: Arc<dyn AuditBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Make a diff callback available under `name`. It runs only if listed
    /// in `crud_diff_callbacks`.
    pub fn register_diff_callback(
        mut self,
        name: impl Into<String>,
        callback: impl DiffCallback + 'static,
    ) -> Self {
        self.callbacks.insert(name.into(), Arc::new(callback));
        self
    }

    /// Validate configuration and connect the backend.
    pub async fn build(self) -> Result<Auditor, AuditError> {
        let config = self.config;
        config.validate()?;

        let entities = ScopeFilter::from_config(&config.entities)?;
        let urls = ScopeFilter::from_config(&config.urls)?;

        let mut diff_callbacks = Vec::with_capacity(config.crud_diff_callbacks.len());
        for name in &config.crud_diff_callbacks {
            let callback = self.callbacks.get(name).ok_or_else(|| {
                AuditError::configuration(format!("unknown crud diff callback '{name}'"))
            })?;
            diff_callbacks.push((name.clone(), callback.clone()));
        }

        let users = self
            .users
            .unwrap_or_else(|| Arc::new(MemoryUserStore::new()));
        let mut identity = IdentityResolver::new(&config.identity, users);
        if let Some(sessions) = self.sessions {
            identity = identity.with_sessions(sessions);
        }
        let decoder = match self.decoder {
            Some(decoder) => Some(decoder),
            None => decoder_from_config(&config.identity.token)?,
        };
        if let Some(decoder) = decoder {
            identity = identity.with_decoder(decoder);
        }

        let locator = self
            .locator
            .unwrap_or_else(|| locator_from_config(&config.geoip));
        let enricher = Enricher::new(config.headers.clone(), locator);

        let backend = match self.backend {
            Some(backend) => backend,
            None => self.registry.create(&config.storage).await?,
        };
        let gateway = Gateway::new(backend, config.propagate_errors);

        tracing::info!(
            auth = config.watch.auth_events,
            model = config.watch.model_events,
            request = config.watch.request_events,
            cors = config.watch.cors_events,
            propagate_errors = config.propagate_errors,
            "Auditor initialized"
        );

        Ok(Auditor {
            watch: config.watch,
            headers: config.headers,
            entities,
            urls,
            skip_unchanged_crud: config.skip_unchanged_crud,
            identity,
            enricher,
            gateway,
            diff_callbacks,
        })
    }
}
