//! Identity resolution from ambient request context.
//!
//! Two credential schemes are tried in a fixed order:
//!
//! 1. **Session cookie**: the configured cookie names a session; the session
//!    holds the authenticated user's id; the user store loads the user.
//! 2. **Bearer token**: the last whitespace separated segment of the
//!    `Authorization` header is decoded to a subject id; the user store loads
//!    the user.
//!
//! Each scheme fails independently. A failure is logged at debug level and
//! resolution moves on; the caller only ever sees "a principal" or "none".

pub mod memory;
pub mod token;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use actlog_core::{IdentityConfig, Principal};

use crate::context::RequestContext;
use crate::error::IdentityError;

pub use memory::{MemorySessionStore, MemoryUserStore};
pub use token::{BiscuitDecoder, JwtDecoder, TokenDecoder};

/// Key/value contents of a server-side session.
pub type SessionData = HashMap<String, String>;

/// Loads sessions by key.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `Ok(None)` when the session does not exist or has expired.
    async fn load(&self, session_key: &str) -> Result<Option<SessionData>, IdentityError>;
}

/// Loads users by id.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<Principal>, IdentityError>;
}

/// Recovers the acting user of a request.
pub struct IdentityResolver {
    session_cookie_name: String,
    session_user_key: String,
    sessions: Option<Arc<dyn SessionStore>>,
    users: Arc<dyn UserStore>,
    decoder: Option<Arc<dyn TokenDecoder>>,
}

impl IdentityResolver {
    pub fn new(config: &IdentityConfig, users: Arc<dyn UserStore>) -> Self {
        Self {
            session_cookie_name: config.session_cookie_name.clone(),
            session_user_key: config.session_user_key.clone(),
            sessions: None,
            users,
            decoder: None,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Resolve the principal behind `ctx`, trying the session cookie first and
    /// the bearer token second.
    pub async fn resolve(&self, ctx: &RequestContext) -> Option<Principal> {
        match self.from_session(ctx).await {
            Ok(Some(principal)) => return Some(principal),
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, path = %ctx.path, "session identity unavailable"),
        }

        match self.from_bearer(ctx).await {
            Ok(Some(principal)) => return Some(principal),
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, path = %ctx.path, "bearer identity unavailable"),
        }

        None
    }

    async fn from_session(&self, ctx: &RequestContext) -> Result<Option<Principal>, IdentityError> {
        let Some(sessions) = &self.sessions else {
            return Ok(None);
        };
        let Some(cookie_header) = ctx.headers.get_non_empty("cookie") else {
            return Ok(None);
        };

        let cookies = parse_cookies(cookie_header)?;
        let Some(session_key) = cookies.get(&self.session_cookie_name) else {
            return Ok(None);
        };

        let session = sessions
            .load(session_key)
            .await?
            .ok_or(IdentityError::UnknownSession)?;
        let user_id = session
            .get(&self.session_user_key)
            .ok_or(IdentityError::AnonymousSession)?;

        self.load_user(user_id).await.map(Some)
    }

    async fn from_bearer(&self, ctx: &RequestContext) -> Result<Option<Principal>, IdentityError> {
        let Some(decoder) = &self.decoder else {
            return Ok(None);
        };
        let Some(authorization) = ctx.headers.get_non_empty("authorization") else {
            return Ok(None);
        };
        let Some(token) = bearer_token(authorization) else {
            return Ok(None);
        };

        let user_id = decoder.decode_subject(token)?;
        self.load_user(&user_id).await.map(Some)
    }

    async fn load_user(&self, user_id: &str) -> Result<Principal, IdentityError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| IdentityError::UnknownUser(user_id.to_string()))
    }
}

/// Parse a `Cookie` header into name/value pairs.
///
/// Pairs without `=` are skipped; values wrapped in double quotes are
/// unquoted. A header containing no valid pair at all is malformed.
pub fn parse_cookies(header: &str) -> Result<HashMap<String, String>, IdentityError> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        cookies
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }

    if cookies.is_empty() {
        return Err(IdentityError::MalformedCookie);
    }
    Ok(cookies)
}

/// Extract the token from an `Authorization` header value.
///
/// Accepts `Bearer <token>` as well as a bare token.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.split_whitespace().last()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticDecoder;

    impl TokenDecoder for StaticDecoder {
        fn decode_subject(&self, token: &str) -> Result<String, IdentityError> {
            match token {
                "good-token" => Ok("2".to_string()),
                "ghost-token" => Ok("404".to_string()),
                "expired-token" => Err(IdentityError::TokenExpired),
                other => Err(IdentityError::InvalidToken(other.to_string())),
            }
        }
    }

    fn resolver() -> IdentityResolver {
        let users = MemoryUserStore::new();
        users.insert(Principal::new("1", "alice"));
        users.insert(Principal::new("2", "bob"));

        let sessions = MemorySessionStore::new();
        sessions.insert_authenticated("live-session", "_auth_user_id", "1");
        sessions.insert("anonymous-session", SessionData::new());
        sessions.insert_authenticated("orphan-session", "_auth_user_id", "999");

        IdentityResolver::new(&IdentityConfig::default(), Arc::new(users))
            .with_sessions(Arc::new(sessions))
            .with_decoder(Arc::new(StaticDecoder))
    }

    fn request() -> RequestContext {
        RequestContext::new("GET", "/orders")
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("csrftoken=abc; sessionid=\"xyz\";  theme=dark").unwrap();
        assert_eq!(cookies["csrftoken"], "abc");
        assert_eq!(cookies["sessionid"], "xyz");
        assert_eq!(cookies["theme"], "dark");
    }

    #[test]
    fn test_parse_cookies_skips_broken_pairs() {
        let cookies = parse_cookies("garbage; sessionid=xyz; =novalue").unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies["sessionid"], "xyz");
    }

    #[test]
    fn test_parse_cookies_malformed() {
        assert!(matches!(
            parse_cookies("no pairs here"),
            Err(IdentityError::MalformedCookie)
        ));
    }

    #[test]
    fn test_bearer_token_forms() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("JWT   abc.def  "), Some("abc.def"));
        assert_eq!(bearer_token("abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("   "), None);
    }

    #[tokio::test]
    async fn test_session_cookie_resolves_user() {
        let ctx = request().with_header("Cookie", "sessionid=live-session");
        let principal = resolver().resolve(&ctx).await.unwrap();
        assert_eq!(principal.username, "alice");
    }

    #[tokio::test]
    async fn test_session_takes_priority_over_token() {
        let ctx = request()
            .with_header("Cookie", "sessionid=live-session")
            .with_header("Authorization", "Bearer good-token");
        let principal = resolver().resolve(&ctx).await.unwrap();
        assert_eq!(principal.username, "alice");
    }

    #[tokio::test]
    async fn test_dead_session_falls_through_to_token() {
        let ctx = request()
            .with_header("Cookie", "sessionid=does-not-exist")
            .with_header("Authorization", "Bearer good-token");
        let principal = resolver().resolve(&ctx).await.unwrap();
        assert_eq!(principal.username, "bob");
    }

    #[tokio::test]
    async fn test_anonymous_and_orphan_sessions_fall_through() {
        for key in ["anonymous-session", "orphan-session"] {
            let ctx = request()
                .with_header("Cookie", format!("sessionid={key}"))
                .with_header("Authorization", "good-token");
            let principal = resolver().resolve(&ctx).await.unwrap();
            assert_eq!(principal.username, "bob", "session {key}");
        }
    }

    #[tokio::test]
    async fn test_malformed_cookie_falls_through_to_token() {
        let ctx = request()
            .with_header("Cookie", ";;;")
            .with_header("Authorization", "Bearer good-token");
        assert_eq!(resolver().resolve(&ctx).await.unwrap().username, "bob");
    }

    #[tokio::test]
    async fn test_bad_tokens_yield_none() {
        for token in ["Bearer expired-token", "Bearer nonsense", "Bearer ghost-token"] {
            let ctx = request().with_header("Authorization", token);
            assert!(resolver().resolve(&ctx).await.is_none(), "{token}");
        }
    }

    #[tokio::test]
    async fn test_no_credentials_yield_none() {
        assert!(resolver().resolve(&request()).await.is_none());
    }

    #[tokio::test]
    async fn test_without_decoder_tokens_are_ignored() {
        let users = MemoryUserStore::new();
        users.insert(Principal::new("2", "bob"));
        let resolver = IdentityResolver::new(&IdentityConfig::default(), Arc::new(users));

        let ctx = request().with_header("Authorization", "Bearer good-token");
        assert!(resolver.resolve(&ctx).await.is_none());
    }
}
