//! Identity resolution configuration.

use serde::{Deserialize, Serialize};

/// Credential schemes used to recover the acting user from a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Cookie carrying the session key.
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,

    /// Session entry holding the authenticated user's id.
    #[serde(default = "default_session_user_key")]
    pub session_user_key: String,

    /// Bearer token decoding.
    #[serde(default)]
    pub token: TokenConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: default_session_cookie_name(),
            session_user_key: default_session_user_key(),
            token: TokenConfig::default(),
        }
    }
}

/// Which bearer token format is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Bearer tokens are ignored.
    #[default]
    None,
    /// HS256 JSON Web Token.
    Jwt,
    /// Biscuit token carrying a `user($id)` fact.
    Biscuit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub kind: TokenKind,

    /// Shared secret for JWT verification.
    #[serde(default)]
    pub secret: Option<String>,

    /// Hex encoded Ed25519 root public key for Biscuit verification.
    #[serde(default)]
    pub public_key: Option<String>,

    /// Name of the JWT claim holding the user id. Falls back to `sub`.
    #[serde(default = "default_user_claim")]
    pub user_claim: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            kind: TokenKind::None,
            secret: None,
            public_key: None,
            user_claim: default_user_claim(),
        }
    }
}

fn default_session_cookie_name() -> String {
    "sessionid".to_string()
}

fn default_session_user_key() -> String {
    "_auth_user_id".to_string()
}

fn default_user_claim() -> String {
    "user_id".to_string()
}
