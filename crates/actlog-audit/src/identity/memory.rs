//! In-process session and user stores.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use actlog_core::Principal;

use super::{SessionData, SessionStore, UserStore};
use crate::error::IdentityError;

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_key: impl Into<String>, data: SessionData) {
        write(&self.sessions).insert(session_key.into(), data);
    }

    /// Store a session holding `user_id` under `user_key`.
    pub fn insert_authenticated(
        &self,
        session_key: impl Into<String>,
        user_key: &str,
        user_id: &str,
    ) {
        let mut data = SessionData::new();
        data.insert(user_key.to_string(), user_id.to_string());
        self.insert(session_key, data);
    }

    pub fn remove(&self, session_key: &str) -> Option<SessionData> {
        write(&self.sessions).remove(session_key)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_key: &str) -> Result<Option<SessionData>, IdentityError> {
        Ok(read(&self.sessions).get(session_key).cloned())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, Principal>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal: Principal) {
        write(&self.users).insert(principal.id.clone(), principal);
    }

    pub fn remove(&self, user_id: &str) -> Option<Principal> {
        write(&self.users).remove(user_id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<Principal> {
        read(&self.users)
            .values()
            .find(|u| u.username == username)
            .cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<Principal>, IdentityError> {
        Ok(read(&self.users).get(user_id).cloned())
    }
}

// Poisoning leaves the map intact; recover it.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!("Memory store lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!("Memory store lock poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_roundtrip_and_removal() {
        let store = MemorySessionStore::new();
        store.insert_authenticated("k", "_auth_user_id", "1");

        let data = store.load("k").await.unwrap().unwrap();
        assert_eq!(data["_auth_user_id"], "1");

        store.remove("k");
        assert!(store.load("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_lookup() {
        let store = MemoryUserStore::new();
        store.insert(Principal::new("1", "alice"));

        assert_eq!(store.find_by_id("1").await.unwrap().unwrap().username, "alice");
        assert!(store.find_by_id("2").await.unwrap().is_none());
        assert_eq!(store.find_by_username("alice").unwrap().id, "1");
    }

    #[tokio::test]
    async fn test_poisoned_store_still_accepts_writes() {
        let store = MemoryUserStore::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.users.write().unwrap();
            panic!("writer crashed");
        }));
        assert!(store.users.is_poisoned());

        store.insert(Principal::new("1", "alice"));
        assert_eq!(store.find_by_username("alice").unwrap().id, "1");
        assert_eq!(store.find_by_id("1").await.unwrap().unwrap().username, "alice");
    }
}
