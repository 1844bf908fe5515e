use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use actlog_audit::backend::AuditBackend;
use actlog_audit::identity::{IdentityResolver, MemorySessionStore, MemoryUserStore};
use actlog_audit::Auditor;
use actlog_core::Principal;

use crate::config::ServerConfig;

/// A demo catalogue item, audited as `shop.item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
    pub price_cents: i64,
}

/// Shared application state.
pub struct AppState {
    pub auditor: Arc<Auditor>,
    pub users: Arc<MemoryUserStore>,
    pub sessions: Arc<MemorySessionStore>,
    /// Session-only resolver used to find who is logging out.
    pub identity: IdentityResolver,
    pub session_cookie_name: String,
    pub session_user_key: String,

    /// username -> Argon2 PHC hash
    password_hashes: HashMap<String, String>,

    pub items: RwLock<BTreeMap<u64, Item>>,
    next_item_id: AtomicU64,
}

impl AppState {
    pub async fn init(cfg: &ServerConfig) -> anyhow::Result<Self> {
        Self::assemble(cfg, None).await
    }

    /// Like [`AppState::init`] but with a caller-provided audit backend.
    pub async fn init_with_backend(
        cfg: &ServerConfig,
        backend: Arc<dyn AuditBackend>,
    ) -> anyhow::Result<Self> {
        Self::assemble(cfg, Some(backend)).await
    }

    async fn assemble(
        cfg: &ServerConfig,
        backend: Option<Arc<dyn AuditBackend>>,
    ) -> anyhow::Result<Self> {
        let users = Arc::new(MemoryUserStore::new());
        let mut password_hashes = HashMap::new();
        for user in &cfg.users {
            users.insert(Principal::new(user.id.clone(), user.username.clone()));
            password_hashes.insert(user.username.clone(), hash_password(&user.password)?);
        }
        let sessions = Arc::new(MemorySessionStore::new());

        let mut builder = Auditor::builder(cfg.actlog.clone())
            .with_users(users.clone())
            .with_sessions(sessions.clone());
        if let Some(backend) = backend {
            builder = builder.with_backend(backend);
        }
        let auditor = Arc::new(builder.build().await?);

        let identity = IdentityResolver::new(&cfg.actlog.identity, users.clone())
            .with_sessions(sessions.clone());

        Ok(Self {
            auditor,
            users,
            sessions,
            identity,
            session_cookie_name: cfg.actlog.identity.session_cookie_name.clone(),
            session_user_key: cfg.actlog.identity.session_user_key.clone(),
            password_hashes,
            items: RwLock::new(BTreeMap::new()),
            next_item_id: AtomicU64::new(1),
        })
    }

    /// The user with `username` if `password` matches.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let hash = self.password_hashes.get(username)?;
        let parsed = PasswordHash::new(hash).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .ok()?;
        self.users.find_by_username(username)
    }

    /// Open a session for `principal` and return its key.
    pub fn open_session(&self, principal: &Principal) -> String {
        let key = uuid::Uuid::new_v4().simple().to_string();
        self.sessions
            .insert_authenticated(key.clone(), &self.session_user_key, &principal.id);
        key
    }

    pub fn next_item_id(&self) -> u64 {
        self.next_item_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(hash)
}
