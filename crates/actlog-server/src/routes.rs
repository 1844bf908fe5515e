//! Demo endpoints: session login/logout and a small `shop.item` resource.
//!
//! Item handlers hold the store lock across the CRUD trigger and commit only
//! after it succeeds, so a propagated audit failure leaves the store unchanged.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

use actlog_audit::context;
use actlog_audit::identity::parse_cookies;
use actlog_audit::{AuditError, ModelChange};
use actlog_core::Principal;

use crate::state::{AppState, Item};

const ITEM_ENTITY: &str = "shop.item";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid credentials")]
    Unauthorized,

    #[error("item {0} not found")]
    NotFound(u64),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Audit(e) => {
                tracing::error!(error = %e, "Audit failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true, "service": "actlog-server" }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let Some(principal) = state.authenticate(&body.username, &body.password) else {
        state.auditor.login_failed(Some(&body.username)).await?;
        return Err(ApiError::Unauthorized);
    };

    state.auditor.login_succeeded(&principal).await?;
    let session_key = state.open_session(&principal);
    attach_principal(&principal);

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        state.session_cookie_name, session_key
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "user_id": principal.id, "username": principal.username })),
    )
        .into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    let Some(ctx) = context::current() else {
        return Ok(StatusCode::NO_CONTENT);
    };
    let Some(principal) = state.identity.resolve(&ctx).await else {
        return Ok(StatusCode::NO_CONTENT);
    };

    state.auditor.logged_out(&principal).await?;
    attach_principal(&principal);

    let session_key = ctx
        .headers
        .get_non_empty("cookie")
        .and_then(|header| parse_cookies(header).ok())
        .and_then(|mut cookies| cookies.remove(&state.session_cookie_name));
    if let Some(key) = session_key {
        state.sessions.remove(&key);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Credit the rest of this request to `principal`. The request record is
/// written after the handler, when the session cookie no longer describes
/// the user (not yet sent on login, already closed on logout).
fn attach_principal(principal: &Principal) {
    if let Some(ctx) = context::current() {
        context::set_current((*ctx).clone().with_principal(principal.clone()));
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemInput {
    pub name: String,
    pub price_cents: i64,
}

fn snapshot(item: &Item) -> Value {
    serde_json::to_value(item).unwrap_or(Value::Null)
}

fn describe(item: &Item) -> String {
    format!("Item #{}: {}", item.id, item.name)
}

pub async fn list_items(State(state): State<Arc<AppState>>) -> Json<Vec<Item>> {
    let items = state.items.read().await;
    Json(items.values().cloned().collect())
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Item>, ApiError> {
    let item = state
        .items
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or(ApiError::NotFound(id))?;

    state
        .auditor
        .model_changed(ModelChange::read(
            ITEM_ENTITY,
            id.to_string(),
            describe(&item),
            snapshot(&item),
        ))
        .await?;
    Ok(Json(item))
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ItemInput>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let mut items = state.items.write().await;
    let item = Item {
        id: state.next_item_id(),
        name: input.name,
        price_cents: input.price_cents,
    };

    state
        .auditor
        .model_changed(ModelChange::created(
            ITEM_ENTITY,
            item.id.to_string(),
            describe(&item),
            snapshot(&item),
        ))
        .await?;
    items.insert(item.id, item.clone());
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(input): Json<ItemInput>,
) -> Result<Json<Item>, ApiError> {
    let mut items = state.items.write().await;
    let before = items.get(&id).cloned().ok_or(ApiError::NotFound(id))?;
    let after = Item {
        id,
        name: input.name,
        price_cents: input.price_cents,
    };

    state
        .auditor
        .model_changed(ModelChange::updated(
            ITEM_ENTITY,
            id.to_string(),
            describe(&after),
            snapshot(&before),
            snapshot(&after),
        ))
        .await?;
    items.insert(id, after.clone());
    Ok(Json(after))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let mut items = state.items.write().await;
    let item = items.get(&id).ok_or(ApiError::NotFound(id))?;

    state
        .auditor
        .model_changed(ModelChange::deleted(
            ITEM_ENTITY,
            id.to_string(),
            describe(item),
            snapshot(item),
        ))
        .await?;
    items.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}
