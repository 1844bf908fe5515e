//! Record builders, one per event kind.
//!
//! Builders are pure: the timestamp, actor and origin are passed in, so the
//! same inputs always produce the same record.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::event::{
    Actor, CorsEvent, CrudEvent, CrudOperation, EventOrigin, LoginEvent, LoginType, RequestEvent,
};

pub fn login_event(
    occurred_at: DateTime<Utc>,
    login_type: LoginType,
    actor: Actor,
    origin: EventOrigin,
) -> LoginEvent {
    LoginEvent {
        occurred_at,
        login_type,
        actor,
        origin,
    }
}

/// Source fields of a CRUD record.
#[derive(Debug, Clone, Copy)]
pub struct CrudSource<'a> {
    pub operation: CrudOperation,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub object_repr: &'a str,
    pub snapshot: &'a Value,
}

/// `changed_fields` is only kept for updates.
pub fn crud_event(
    occurred_at: DateTime<Utc>,
    source: CrudSource<'_>,
    changed_fields: Option<Map<String, Value>>,
    actor: Actor,
    origin: EventOrigin,
) -> CrudEvent {
    CrudEvent {
        occurred_at,
        operation: source.operation,
        entity_type: source.entity_type.to_string(),
        entity_id: source.entity_id.to_string(),
        object_repr: source.object_repr.to_string(),
        object_json_repr: source.snapshot.clone(),
        changed_fields: match source.operation {
            CrudOperation::Update => changed_fields,
            _ => None,
        },
        actor,
        origin,
    }
}

pub fn request_event(
    occurred_at: DateTime<Utc>,
    request: &RequestContext,
    actor: Actor,
    origin: EventOrigin,
) -> RequestEvent {
    RequestEvent {
        occurred_at,
        method: request.method.to_ascii_uppercase(),
        url: request.path.clone(),
        query_string: request.query_string.clone(),
        actor,
        origin,
    }
}

/// `frontend_url` is the page that issued the call; `frontend_method` the
/// method it reported, if any.
pub fn cors_event(
    occurred_at: DateTime<Utc>,
    request: &RequestContext,
    frontend_url: &str,
    frontend_method: Option<&str>,
    actor: Actor,
    origin: EventOrigin,
) -> CorsEvent {
    CorsEvent {
        occurred_at,
        method: frontend_method
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_ascii_uppercase),
        url: frontend_url.to_string(),
        query_string: request.query_string.clone(),
        actor,
        origin,
    }
}
