//! SQL database backend (SQLite via sqlx).
//!
//! Four parallel tables, one per event kind, share the common actor/origin
//! columns. Every record goes through [`DatabaseBackend::insert_record`], which
//! opens a transaction on the pool selected by the storage alias, inserts one
//! row and commits.

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions};
use sqlx::Arguments;
use std::path::Path;

use actlog_core::StorageConfig;

use super::AuditBackend;
use crate::error::{AuditError, PersistenceError};
use crate::event::{Actor, CorsEvent, CrudEvent, EventOrigin, LoginEvent, RecordId, RequestEvent};

pub const LOGIN_TABLE: &str = "actlog_login_events";
pub const CRUD_TABLE: &str = "actlog_crud_events";
pub const REQUEST_TABLE: &str = "actlog_request_events";
pub const CORS_TABLE: &str = "actlog_cors_events";

const COMMON_COLUMNS: &str = "
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_kind TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    user_id TEXT,
    username TEXT,
    remote_ip TEXT,
    latitude REAL,
    longitude REAL,
    city TEXT,
    country TEXT,
    browser TEXT,
    platform TEXT,
    operating_system TEXT";

fn table_definitions() -> [(&'static str, &'static str); 4] {
    [
        (LOGIN_TABLE, "login_type TEXT NOT NULL"),
        (
            CRUD_TABLE,
            "operation TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            object_repr TEXT NOT NULL,
            object_json_repr TEXT,
            changed_fields TEXT",
        ),
        (
            REQUEST_TABLE,
            "method TEXT NOT NULL,
            url TEXT NOT NULL,
            query_string TEXT",
        ),
        (
            CORS_TABLE,
            "method TEXT,
            url TEXT NOT NULL,
            query_string TEXT",
        ),
    ]
}

/// A value bound to one insert column.
#[derive(Debug, Clone)]
enum Column {
    Text(Option<String>),
    Real(Option<f64>),
    Json(Option<Value>),
}

impl From<&str> for Column {
    fn from(value: &str) -> Self {
        Column::Text(Some(value.to_string()))
    }
}

impl From<Option<&String>> for Column {
    fn from(value: Option<&String>) -> Self {
        Column::Text(value.cloned())
    }
}

fn args_add<'q, T>(args: &mut SqliteArguments<'q>, v: T) -> Result<(), PersistenceError>
where
    T: 'q + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    args.add(v)
        .map_err(|e| PersistenceError::Storage(format!("failed to bind value: {e}")))
}

fn bind(args: &mut SqliteArguments<'_>, column: Column) -> Result<(), PersistenceError> {
    match column {
        Column::Text(v) => args_add(args, v),
        Column::Real(v) => args_add(args, v),
        Column::Json(v) => args_add(args, v.map(sqlx::types::Json)),
    }
}

/// Columns shared by every table.
fn common_columns(
    kind: &str,
    occurred_at: chrono::DateTime<chrono::Utc>,
    actor: &Actor,
    origin: &EventOrigin,
) -> Vec<(&'static str, Column)> {
    vec![
        ("event_kind", kind.into()),
        (
            "occurred_at",
            occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true).as_str().into(),
        ),
        ("user_id", actor.user_id.as_ref().into()),
        ("username", actor.username.as_ref().into()),
        ("remote_ip", origin.remote_ip.as_ref().into()),
        ("latitude", Column::Real(origin.geo.latitude)),
        ("longitude", Column::Real(origin.geo.longitude)),
        ("city", origin.geo.city.as_ref().into()),
        ("country", origin.geo.country.as_ref().into()),
        ("browser", origin.client.browser.as_ref().into()),
        ("platform", origin.client.platform.as_ref().into()),
        ("operating_system", origin.client.operating_system.as_ref().into()),
    ]
}

/// Backend writing to the database registered under the configured alias.
pub struct DatabaseBackend {
    alias: String,
    pool: SqlitePool,
}

impl DatabaseBackend {
    /// Connect to the database selected by `config.alias` and create the
    /// tables if they do not exist.
    pub async fn connect(config: &StorageConfig) -> Result<Self, AuditError> {
        let database = config.selected_database().ok_or_else(|| {
            AuditError::configuration(format!(
                "storage alias '{}' has no database configured",
                config.alias
            ))
        })?;

        ensure_parent_dir(&database.url).map_err(PersistenceError::from)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(database.max_connections.max(1))
            .connect(&database.url)
            .await
            .map_err(PersistenceError::from)?;

        let backend = Self::with_pool(config.alias.clone(), pool);
        backend.create_tables().await?;
        tracing::info!(alias = %backend.alias, "Audit database connected");
        Ok(backend)
    }

    /// Wrap an existing pool. Tables are not created.
    pub fn with_pool(alias: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            alias: alias.into(),
            pool,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_tables(&self) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        for (table, columns) in table_definitions() {
            let sql =
                format!("CREATE TABLE IF NOT EXISTS {table} ({COMMON_COLUMNS},\n    {columns})");
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert one row into `table` inside its own transaction.
    async fn insert_record(
        &self,
        table: &str,
        columns: Vec<(&'static str, Column)>,
    ) -> Result<RecordId, PersistenceError> {
        let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders
        );

        let mut args = SqliteArguments::default();
        for (_, column) in columns {
            bind(&mut args, column)?;
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query_with(&sql, args).execute(&mut *tx).await?;
        tx.commit().await?;

        let id = RecordId(result.last_insert_rowid());
        tracing::debug!(table, %id, "Audit record stored");
        Ok(id)
    }
}

#[async_trait]
impl AuditBackend for DatabaseBackend {
    async fn persist_login(&self, event: &LoginEvent) -> Result<RecordId, PersistenceError> {
        let mut columns = common_columns("LOGIN", event.occurred_at, &event.actor, &event.origin);
        columns.push(("login_type", event.login_type.as_str().into()));
        self.insert_record(LOGIN_TABLE, columns).await
    }

    async fn persist_crud(&self, event: &CrudEvent) -> Result<RecordId, PersistenceError> {
        let mut columns = common_columns("CRUD", event.occurred_at, &event.actor, &event.origin);
        columns.extend([
            ("operation", event.operation.as_str().into()),
            ("entity_type", event.entity_type.as_str().into()),
            ("entity_id", event.entity_id.as_str().into()),
            ("object_repr", event.object_repr.as_str().into()),
            ("object_json_repr", Column::Json(Some(event.object_json_repr.clone()))),
            (
                "changed_fields",
                Column::Json(event.changed_fields.clone().map(Value::Object)),
            ),
        ]);
        self.insert_record(CRUD_TABLE, columns).await
    }

    async fn persist_request(&self, event: &RequestEvent) -> Result<RecordId, PersistenceError> {
        let mut columns = common_columns("REQUEST", event.occurred_at, &event.actor, &event.origin);
        columns.extend([
            ("method", event.method.as_str().into()),
            ("url", event.url.as_str().into()),
            ("query_string", event.query_string.as_ref().into()),
        ]);
        self.insert_record(REQUEST_TABLE, columns).await
    }

    async fn persist_cors(&self, event: &CorsEvent) -> Result<RecordId, PersistenceError> {
        let mut columns = common_columns("CORS", event.occurred_at, &event.actor, &event.origin);
        columns.extend([
            ("method", event.method.as_ref().into()),
            ("url", event.url.as_str().into()),
            ("query_string", event.query_string.as_ref().into()),
        ]);
        self.insert_record(CORS_TABLE, columns).await
    }
}

/// Create the directory holding a file-backed SQLite database.
fn ensure_parent_dir(url: &str) -> std::io::Result<()> {
    let Some(rest) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
