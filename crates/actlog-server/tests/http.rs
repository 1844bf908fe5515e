use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    Router,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use actlog_audit::backend::{AuditBackend, MemoryBackend};
use actlog_audit::{
    AuditRecord, CorsEvent, CrudEvent, CrudOperation, EventKind, LoginEvent, LoginType,
    PersistenceError, RecordId, RequestEvent,
};
use actlog_server::config::DemoUser;
use actlog_server::state::Item;
use actlog_server::{AppState, ServerConfig, app};

fn config() -> ServerConfig {
    let mut cfg = ServerConfig {
        users: vec![DemoUser {
            id: "1".to_string(),
            username: "alice".to_string(),
            password: "wonderland".to_string(),
        }],
        ..Default::default()
    };
    cfg.actlog.urls.deny_extra = vec!["^/healthz$".to_string()];
    cfg
}

async fn setup(cfg: ServerConfig) -> (Router, Arc<AppState>, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let state = Arc::new(AppState::init_with_backend(&cfg, backend.clone()).await.unwrap());
    (app(state.clone()), state, backend)
}

fn json_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn login(app: &Router) -> String {
    let body = json!({"username": "alice", "password": "wonderland"});
    let response = send(
        app,
        json_request("POST", "/login")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_healthz_is_not_audited() {
    let (app, _, backend) = setup(config()).await;
    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["ok"], true);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_login_records_login_and_request() {
    let (app, _, backend) = setup(config()).await;
    let body = json!({"username": "alice", "password": "wonderland"});
    let response = send(
        &app,
        json_request("POST", "/login")
            .header("x-forwarded-for", "198.51.100.7")
            .header("sec-ch-ua", "\"Chromium\";v=\"128\"")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let logins = backend.records_of(EventKind::Login);
    assert_eq!(logins.len(), 1);
    let AuditRecord::Login(event) = &logins[0] else {
        panic!("expected a login record");
    };
    assert_eq!(event.login_type, LoginType::Login);
    assert_eq!(event.actor.username.as_deref(), Some("alice"));
    assert_eq!(event.origin.remote_ip.as_deref(), Some("198.51.100.7"));
    assert_eq!(event.origin.client.browser.as_deref(), Some("\"Chromium\";v=\"128\""));

    let requests = backend.records_of(EventKind::Request);
    assert_eq!(requests.len(), 1);
    let AuditRecord::Request(event) = &requests[0] else {
        panic!("expected a request record");
    };
    assert_eq!(event.method, "POST");
    assert_eq!(event.url, "/login");
    assert_eq!(event.actor.username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_wrong_password_records_failed_login() {
    let (app, _, backend) = setup(config()).await;
    let body = json!({"username": "alice", "password": "nope"});
    let response = send(
        &app,
        json_request("POST", "/login")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let logins = backend.records_of(EventKind::Login);
    let AuditRecord::Login(event) = &logins[0] else {
        panic!("expected a login record");
    };
    assert_eq!(event.login_type, LoginType::Failed);
    assert_eq!(event.actor.user_id, None);
    assert_eq!(event.actor.username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_item_lifecycle_is_attributed_to_session_user() {
    let (app, _, backend) = setup(config()).await;
    let cookie = login(&app).await;

    let create = json!({"name": "pen", "price_cents": 200});
    let response = send(
        &app,
        json_request("POST", "/items")
            .header(header::COOKIE, &cookie)
            .body(Body::from(create.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let update = json!({"name": "pen", "price_cents": 250});
    let response = send(
        &app,
        json_request("PUT", "/items/1")
            .header(header::COOKIE, &cookie)
            .body(Body::from(update.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/items/1")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let cruds: Vec<CrudEvent> = backend
        .records_of(EventKind::Crud)
        .into_iter()
        .filter_map(|r| match r {
            AuditRecord::Crud(e) => Some(e),
            _ => None,
        })
        .collect();
    let operations: Vec<CrudOperation> = cruds.iter().map(|e| e.operation).collect();
    assert_eq!(
        operations,
        vec![CrudOperation::Create, CrudOperation::Update, CrudOperation::Delete]
    );
    for event in &cruds {
        assert_eq!(event.entity_type, "shop.item");
        assert_eq!(event.entity_id, "1");
        assert_eq!(event.actor.username.as_deref(), Some("alice"));
    }
    assert_eq!(
        cruds[1].changed_fields.as_ref().unwrap()["price_cents"],
        json!({"old": 200, "new": 250})
    );
    assert_eq!(cruds[2].object_json_repr["price_cents"], 250);

    // login + three item requests
    assert_eq!(backend.records_of(EventKind::Request).len(), 4);
}

#[tokio::test]
async fn test_unchanged_update_skipped_when_configured() {
    let mut cfg = config();
    cfg.actlog.skip_unchanged_crud = true;
    let (app, _, backend) = setup(cfg).await;

    let item = json!({"name": "pen", "price_cents": 200});
    for (method, uri) in [("POST", "/items"), ("PUT", "/items/1")] {
        let response = send(
            &app,
            json_request(method, uri)
                .body(Body::from(item.to_string()))
                .unwrap(),
        )
        .await;
        assert!(response.status().is_success());
    }

    let cruds = backend.records_of(EventKind::Crud);
    assert_eq!(cruds.len(), 1);
    assert!(matches!(&cruds[0], AuditRecord::Crud(e) if e.operation == CrudOperation::Create));
}

#[tokio::test]
async fn test_logout_records_and_ends_session() {
    let (app, state, backend) = setup(config()).await;
    let cookie = login(&app).await;

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/logout")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let logouts: Vec<AuditRecord> = backend
        .records_of(EventKind::Login)
        .into_iter()
        .filter(|r| matches!(r, AuditRecord::Login(e) if e.login_type == LoginType::Logout))
        .collect();
    assert_eq!(logouts.len(), 1);
    assert_eq!(logouts[0].actor().username.as_deref(), Some("alice"));

    let key = cookie.split_once('=').unwrap().1;
    assert!(state.sessions.remove(key).is_none());

    let logout_request = backend
        .records_of(EventKind::Request)
        .into_iter()
        .find(|r| matches!(r, AuditRecord::Request(e) if e.url == "/logout"))
        .unwrap();
    assert_eq!(logout_request.actor().username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_cors_event_only_with_frontend_header() {
    let (app, _, backend) = setup(config()).await;

    send(&app, Request::builder().uri("/items").body(Body::empty()).unwrap()).await;
    assert!(backend.records_of(EventKind::Cors).is_empty());

    send(
        &app,
        Request::builder()
            .uri("/items?page=2")
            .header("x-frontend-url", "https://shop.example.com/catalogue")
            .header("x-url-method", "GET")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let cors = backend.records_of(EventKind::Cors);
    assert_eq!(cors.len(), 1);
    let AuditRecord::Cors(event) = &cors[0] else {
        panic!("expected a cors record");
    };
    assert_eq!(event.url, "https://shop.example.com/catalogue");
    assert_eq!(event.method.as_deref(), Some("GET"));
    assert_eq!(event.query_string.as_deref(), Some("page=2"));
}

#[derive(Default)]
struct RejectingBackend;

#[async_trait]
impl AuditBackend for RejectingBackend {
    async fn persist_login(&self, _e: &LoginEvent) -> Result<RecordId, PersistenceError> {
        Err(PersistenceError::Storage("read-only".to_string()))
    }
    async fn persist_crud(&self, _e: &CrudEvent) -> Result<RecordId, PersistenceError> {
        Err(PersistenceError::Storage("read-only".to_string()))
    }
    async fn persist_request(&self, _e: &RequestEvent) -> Result<RecordId, PersistenceError> {
        Err(PersistenceError::Storage("read-only".to_string()))
    }
    async fn persist_cors(&self, _e: &CorsEvent) -> Result<RecordId, PersistenceError> {
        Err(PersistenceError::Storage("read-only".to_string()))
    }
}

#[tokio::test]
async fn test_propagated_audit_failure_fails_request() {
    let mut cfg = config();
    cfg.actlog.propagate_errors = true;
    let state = AppState::init_with_backend(&cfg, Arc::new(RejectingBackend))
        .await
        .unwrap();
    let state = Arc::new(state);
    let app = app(state);

    let response = send(&app, Request::builder().uri("/items").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// Accepts everything except CRUD records.
#[derive(Default)]
struct CrudRejectingBackend {
    inner: MemoryBackend,
}

#[async_trait]
impl AuditBackend for CrudRejectingBackend {
    async fn persist_login(&self, e: &LoginEvent) -> Result<RecordId, PersistenceError> {
        self.inner.persist_login(e).await
    }
    async fn persist_crud(&self, _e: &CrudEvent) -> Result<RecordId, PersistenceError> {
        Err(PersistenceError::Storage("read-only".to_string()))
    }
    async fn persist_request(&self, e: &RequestEvent) -> Result<RecordId, PersistenceError> {
        self.inner.persist_request(e).await
    }
    async fn persist_cors(&self, e: &CorsEvent) -> Result<RecordId, PersistenceError> {
        self.inner.persist_cors(e).await
    }
}

#[tokio::test]
async fn test_failed_crud_audit_leaves_items_untouched() {
    let mut cfg = config();
    cfg.actlog.propagate_errors = true;
    let backend = Arc::new(CrudRejectingBackend::default());
    let state = Arc::new(AppState::init_with_backend(&cfg, backend).await.unwrap());
    let app = app(state.clone());

    let item = json!({"name": "pen", "price_cents": 200});
    let response = send(
        &app,
        json_request("POST", "/items")
            .body(Body::from(item.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.items.read().await.is_empty());

    let existing = Item {
        id: 7,
        name: "ink".to_string(),
        price_cents: 300,
    };
    state.items.write().await.insert(7, existing.clone());

    let update = json!({"name": "ink", "price_cents": 999});
    let response = send(
        &app,
        json_request("PUT", "/items/7")
            .body(Body::from(update.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/items/7")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let items = state.items.read().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items.get(&7), Some(&existing));
}

#[tokio::test]
async fn test_audit_failure_is_invisible_by_default() {
    let state = AppState::init_with_backend(&config(), Arc::new(RejectingBackend))
        .await
        .unwrap();
    let state = Arc::new(state);
    let app = app(state);

    let response = send(&app, Request::builder().uri("/items").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bearer_token_identifies_user() {
    let mut cfg = config();
    cfg.actlog.identity.token.kind = actlog_core::TokenKind::Jwt;
    cfg.actlog.identity.token.secret = Some("server-secret".to_string());
    let (app, _, backend) = setup(cfg).await;

    let claims = json!({"sub": "1", "exp": chrono::Utc::now().timestamp() + 600});
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"server-secret"),
    )
    .unwrap();

    send(
        &app,
        Request::builder()
            .uri("/items")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let requests = backend.records_of(EventKind::Request);
    assert_eq!(requests[0].actor().username.as_deref(), Some("alice"));
}
