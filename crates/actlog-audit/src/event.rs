//! Audit record types.
//!
//! Every record shares an [`Actor`] and an [`EventOrigin`]; the four record
//! types add the fields specific to their kind. Records are plain data: they
//! are built by [`crate::normalize`], handed once to a backend and never read
//! back by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicI64, Ordering};

use actlog_core::Principal;

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Login,
    Crud,
    Request,
    Cors,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Login => write!(f, "LOGIN"),
            Self::Crud => write!(f, "CRUD"),
            Self::Request => write!(f, "REQUEST"),
            Self::Cors => write!(f, "CORS"),
        }
    }
}

/// Authentication transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoginType {
    Login,
    Logout,
    Failed,
}

impl LoginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::Failed => "FAILED",
        }
    }
}

/// Operation performed on a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrudOperation {
    Create,
    Update,
    Delete,
    Read,
}

impl CrudOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Read => "READ",
        }
    }
}

/// Identity assigned to a stored record by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who acted. Both fields are independently optional: a failed login knows
/// the attempted username but no user id, an anonymous request knows neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn username_only(username: impl Into<String>) -> Self {
        Self {
            user_id: None,
            username: Some(username.into()),
        }
    }
}

impl From<&Principal> for Actor {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: Some(principal.id.clone()),
            username: Some(principal.username.clone()),
        }
    }
}

impl From<Option<&Principal>> for Actor {
    fn from(principal: Option<&Principal>) -> Self {
        principal.map(Actor::from).unwrap_or_default()
    }
}

/// Approximate location of the remote address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl GeoLocation {
    pub fn is_empty(&self) -> bool {
        self.latitude.is_none()
            && self.longitude.is_none()
            && self.city.is_none()
            && self.country.is_none()
    }
}

/// Client hints reported by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub browser: Option<String>,
    pub platform: Option<String>,
    pub operating_system: Option<String>,
}

/// Where an event came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOrigin {
    pub remote_ip: Option<String>,
    #[serde(flatten)]
    pub geo: GeoLocation,
    #[serde(flatten)]
    pub client: ClientDescriptor,
}

/// Authentication event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub occurred_at: DateTime<Utc>,
    pub login_type: LoginType,
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(flatten)]
    pub origin: EventOrigin,
}

/// Data-mutation event on a tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudEvent {
    pub occurred_at: DateTime<Utc>,
    pub operation: CrudOperation,
    /// Qualified entity type, e.g. `shop.item`.
    pub entity_type: String,
    pub entity_id: String,
    /// Human-readable representation of the object.
    pub object_repr: String,
    /// Snapshot of the object (state before a delete, after anything else).
    pub object_json_repr: Value,
    /// `{field: {old, new}}` for updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(flatten)]
    pub origin: EventOrigin,
}

/// Inbound HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub occurred_at: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub query_string: Option<String>,
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(flatten)]
    pub origin: EventOrigin,
}

/// Frontend-originated (cross-origin) request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorsEvent {
    pub occurred_at: DateTime<Utc>,
    /// Method reported by the frontend, when it reports one.
    pub method: Option<String>,
    /// Frontend URL that issued the call.
    pub url: String,
    pub query_string: Option<String>,
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(flatten)]
    pub origin: EventOrigin,
}

/// Any of the four records, tagged with its kind.
///
/// Used by backends that keep all kinds in one stream (memory, console, file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_kind", rename_all = "UPPERCASE")]
pub enum AuditRecord {
    Login(LoginEvent),
    Crud(CrudEvent),
    Request(RequestEvent),
    Cors(CorsEvent),
}

impl AuditRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Login(_) => EventKind::Login,
            Self::Crud(_) => EventKind::Crud,
            Self::Request(_) => EventKind::Request,
            Self::Cors(_) => EventKind::Cors,
        }
    }

    pub fn actor(&self) -> &Actor {
        match self {
            Self::Login(e) => &e.actor,
            Self::Crud(e) => &e.actor,
            Self::Request(e) => &e.actor,
            Self::Cors(e) => &e.actor,
        }
    }

    pub fn origin(&self) -> &EventOrigin {
        match self {
            Self::Login(e) => &e.origin,
            Self::Crud(e) => &e.origin,
            Self::Request(e) => &e.origin,
            Self::Cors(e) => &e.origin,
        }
    }
}

static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current wall-clock time, never earlier than a timestamp previously
/// returned by this function in the same process.
pub fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now();
    let micros = now.timestamp_micros();
    let previous = LAST_TIMESTAMP_MICROS.fetch_max(micros, Ordering::SeqCst);
    if previous <= micros {
        return now;
    }
    DateTime::<Utc>::from_timestamp_micros(previous).unwrap_or(now)
}

/// Compute the changed fields between two JSON values.
///
/// Returns `{field: {"old": ..., "new": ...}}` for every field that differs.
/// Non-object values are compared as a whole under the `value` key.
pub fn field_diff(before: &Value, after: &Value) -> Map<String, Value> {
    let mut diff = Map::new();

    match (before, after) {
        (Value::Object(before_obj), Value::Object(after_obj)) => {
            for (key, before_val) in before_obj {
                match after_obj.get(key) {
                    Some(after_val) if before_val != after_val => {
                        diff.insert(key.clone(), json!({ "old": before_val, "new": after_val }));
                    }
                    None => {
                        diff.insert(key.clone(), json!({ "old": before_val, "new": null }));
                    }
                    _ => {}
                }
            }

            for (key, after_val) in after_obj {
                if !before_obj.contains_key(key) {
                    diff.insert(key.clone(), json!({ "old": null, "new": after_val }));
                }
            }
        }
        _ => {
            if before != after {
                diff.insert("value".to_string(), json!({ "old": before, "new": after }));
            }
        }
    }

    diff
}
