//! Bearer token decoders.

use biscuit_auth::builder::AuthorizerBuilder;
use biscuit_auth::{Algorithm as BiscuitAlgorithm, Biscuit, PublicKey};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use actlog_core::{TokenConfig, TokenKind};

use crate::error::{AuditError, IdentityError};

/// Verifies a bearer token and extracts the id of the user it was issued to.
pub trait TokenDecoder: Send + Sync {
    fn decode_subject(&self, token: &str) -> Result<String, IdentityError>;
}

/// Build the decoder selected in configuration. `TokenKind::None` yields no decoder.
pub fn decoder_from_config(
    config: &TokenConfig,
) -> Result<Option<Arc<dyn TokenDecoder>>, AuditError> {
    match config.kind {
        TokenKind::None => Ok(None),
        TokenKind::Jwt => {
            let secret = config.secret.as_deref().ok_or_else(|| {
                AuditError::configuration("identity.token.secret is required for jwt tokens")
            })?;
            Ok(Some(Arc::new(
                JwtDecoder::hs256(secret.as_bytes()).with_user_claim(&config.user_claim),
            )))
        }
        TokenKind::Biscuit => {
            let public_key = config.public_key.as_deref().ok_or_else(|| {
                AuditError::configuration(
                    "identity.token.public_key is required for biscuit tokens",
                )
            })?;
            Ok(Some(Arc::new(BiscuitDecoder::from_public_key_hex(public_key)?)))
        }
    }
}

/// HS256 JSON Web Token decoder.
///
/// The user id is read from the configured claim (default `user_id`), falling
/// back to `sub`. String and numeric ids are both accepted.
pub struct JwtDecoder {
    key: DecodingKey,
    validation: Validation,
    user_claim: String,
}

impl JwtDecoder {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            user_claim: "user_id".to_string(),
        }
    }

    pub fn with_user_claim(mut self, claim: &str) -> Self {
        self.user_claim = claim.to_string();
        self
    }
}

impl TokenDecoder for JwtDecoder {
    fn decode_subject(&self, token: &str) -> Result<String, IdentityError> {
        let claims =
            jsonwebtoken::decode::<HashMap<String, Value>>(token, &self.key, &self.validation)
                .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => IdentityError::TokenExpired,
                _ => IdentityError::InvalidToken(e.to_string()),
            })?;

        claims
            .get(&self.user_claim)
            .or_else(|| claims.get("sub"))
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| IdentityError::MissingSubject(self.user_claim.clone()))
    }
}

/// Biscuit token decoder. The user id is the `user($id)` fact of the authority block.
pub struct BiscuitDecoder {
    root: PublicKey,
}

impl BiscuitDecoder {
    pub fn new(root: PublicKey) -> Self {
        Self { root }
    }

    pub fn from_public_key_hex(hex: &str) -> Result<Self, AuditError> {
        let root = PublicKey::from_bytes_hex(hex.trim(), BiscuitAlgorithm::Ed25519)
            .map_err(|e| AuditError::configuration(format!("invalid biscuit public key: {e}")))?;
        Ok(Self::new(root))
    }
}

impl TokenDecoder for BiscuitDecoder {
    fn decode_subject(&self, token: &str) -> Result<String, IdentityError> {
        let biscuit = Biscuit::from_base64(token, self.root.clone())
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        let now = chrono::Utc::now().timestamp();
        let mut authorizer = AuthorizerBuilder::new()
            .code(format!(
                r#"
                time({now});
                allow if true;
                "#
            ))
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?
            .build(&biscuit)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        // Expiry checks attached to the token fail here.
        authorizer
            .authorize()
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        let users: Vec<(String,)> = authorizer
            .query("data($u) <- user($u)")
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        users
            .into_iter()
            .next()
            .map(|(user,)| user)
            .ok_or_else(|| IdentityError::MissingSubject("user".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biscuit_auth::macros::fact;
    use biscuit_auth::{KeyPair, PrivateKey};
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret";

    fn jwt(claims: Value) -> String {
        let key = EncodingKey::from_secret(SECRET);
        jsonwebtoken::encode(&Header::default(), &claims, &key).unwrap()
    }

    fn in_future() -> i64 {
        chrono::Utc::now().timestamp() + 600
    }

    #[test]
    fn test_jwt_user_id_claim() {
        let token = jwt(json!({"user_id": 42, "exp": in_future()}));
        assert_eq!(JwtDecoder::hs256(SECRET).decode_subject(&token).unwrap(), "42");
    }

    #[test]
    fn test_jwt_falls_back_to_sub() {
        let token = jwt(json!({"sub": "abc", "exp": in_future()}));
        assert_eq!(JwtDecoder::hs256(SECRET).decode_subject(&token).unwrap(), "abc");
    }

    #[test]
    fn test_jwt_custom_claim() {
        let token = jwt(json!({"uid": "7", "exp": in_future()}));
        let decoder = JwtDecoder::hs256(SECRET).with_user_claim("uid");
        assert_eq!(decoder.decode_subject(&token).unwrap(), "7");
    }

    #[test]
    fn test_jwt_expired() {
        let token = jwt(json!({"user_id": 1, "exp": chrono::Utc::now().timestamp() - 3600}));
        assert!(matches!(
            JwtDecoder::hs256(SECRET).decode_subject(&token),
            Err(IdentityError::TokenExpired)
        ));
    }

    #[test]
    fn test_jwt_wrong_secret() {
        let token = jwt(json!({"user_id": 1, "exp": in_future()}));
        assert!(matches!(
            JwtDecoder::hs256(b"other").decode_subject(&token),
            Err(IdentityError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_jwt_missing_subject() {
        let token = jwt(json!({"exp": in_future()}));
        assert!(matches!(
            JwtDecoder::hs256(SECRET).decode_subject(&token),
            Err(IdentityError::MissingSubject(_))
        ));
    }

    #[test]
    fn test_jwt_garbage() {
        assert!(JwtDecoder::hs256(SECRET).decode_subject("not.a.jwt").is_err());
    }

    fn biscuit_keypair() -> KeyPair {
        let private = PrivateKey::from_bytes(&[7u8; 32], BiscuitAlgorithm::Ed25519).unwrap();
        KeyPair::from(&private)
    }

    #[test]
    fn test_biscuit_user_fact() {
        let keypair = biscuit_keypair();
        let token = Biscuit::builder()
            .fact(fact!("user({id})", id = "42"))
            .unwrap()
            .build(&keypair)
            .unwrap()
            .to_base64()
            .unwrap();

        let public_key = keypair.public().to_bytes_hex();
        let decoder = BiscuitDecoder::from_public_key_hex(&public_key).unwrap();
        assert_eq!(decoder.decode_subject(&token).unwrap(), "42");
    }

    #[test]
    fn test_biscuit_without_user_fact() {
        let keypair = biscuit_keypair();
        let token = Biscuit::builder()
            .fact(fact!("role({role})", role = "admin"))
            .unwrap()
            .build(&keypair)
            .unwrap()
            .to_base64()
            .unwrap();

        let decoder = BiscuitDecoder::new(keypair.public());
        assert!(matches!(
            decoder.decode_subject(&token),
            Err(IdentityError::MissingSubject(_))
        ));
    }

    #[test]
    fn test_decoder_from_config() {
        assert!(decoder_from_config(&TokenConfig::default()).unwrap().is_none());

        let missing_secret = TokenConfig {
            kind: TokenKind::Jwt,
            ..Default::default()
        };
        assert!(matches!(
            decoder_from_config(&missing_secret),
            Err(AuditError::Configuration(_))
        ));

        let jwt_config = TokenConfig {
            kind: TokenKind::Jwt,
            secret: Some("test-secret".to_string()),
            user_claim: "user_id".to_string(),
            ..Default::default()
        };
        let decoder = decoder_from_config(&jwt_config).unwrap().unwrap();
        let token = jwt(json!({"user_id": "5", "exp": in_future()}));
        assert_eq!(decoder.decode_subject(&token).unwrap(), "5");
    }
}
