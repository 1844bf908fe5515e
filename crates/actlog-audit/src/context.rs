//! Task-local request context.
//!
//! The HTTP layer wraps each request in [`scope`]; code running inside that
//! future (handlers, repositories, auth callbacks) recovers the request with
//! [`current`] without it being passed down explicitly. Concurrent requests
//! run in separate scopes and never observe each other's context, and a scope
//! ends with its request, so a reused worker thread cannot leak a previous
//! request into the next one.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use actlog_core::Principal;

tokio::task_local! {
    static CURRENT: RefCell<Option<Arc<RequestContext>>>;
}

/// Case-insensitive header map.
///
/// Repeated headers are folded into one value separated by `", "`, except
/// `cookie` which is folded with `"; "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        let separator = if name == "cookie" { "; " } else { ", " };
        self.0
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(separator);
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Header value, trimmed, with empty values treated as absent.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// Transport-level view of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query_string: Option<String>,
    pub headers: Headers,
    /// Address of the connected peer.
    pub peer_addr: Option<IpAddr>,
    /// User the host application already authenticated for this request.
    /// Takes precedence over credentials carried in the headers.
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query_string: None,
            headers: Headers::new(),
            peer_addr: None,
            principal: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query_string = (!query.is_empty()).then_some(query);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_peer_addr(mut self, addr: IpAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }
}

/// Run `fut` with `ctx` as its current request.
pub async fn scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT
        .scope(RefCell::new(Some(Arc::new(ctx))), fut)
        .await
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<R>(ctx: RequestContext, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(RefCell::new(Some(Arc::new(ctx))), f)
}

/// The current request, if the caller runs inside a [`scope`].
pub fn current() -> Option<Arc<RequestContext>> {
    CURRENT
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

/// Replace the current request for the rest of the enclosing scope.
///
/// Returns `false` (and stores nothing) outside of a scope.
pub fn set_current(ctx: RequestContext) -> bool {
    CURRENT
        .try_with(|cell| {
            cell.replace(Some(Arc::new(ctx)));
        })
        .is_ok()
}
