// ABOUTME: Signed, expiring access tokens for conflict view links
// ABOUTME: base64url(JSON claims) "." base64url(HMAC-SHA256 of the claims segment)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Claim type carried by conflict view links.
pub const CONFLICT_VIEW: &str = "conflict_view";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Claims inside a conflict view link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictViewClaims {
    pub conflict_id: i64,
    pub user_id: i64,
    pub username: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub exp: i64,
}

/// Issues and verifies HMAC-signed tokens.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign `claims`, setting `exp` to now plus the codec's lifetime.
    pub fn encode(&self, mut claims: Map<String, JsonValue>) -> Result<String, TokenError> {
        let exp = (Utc::now() + self.ttl).timestamp();
        claims.insert("exp".to_string(), JsonValue::from(exp));

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| TokenError::Malformed(format!("cannot serialize claims: {}", e)))?;
        let body = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(body.as_bytes())?.finalize().into_bytes());
        Ok(format!("{}.{}", body, signature))
    }

    /// Verify the signature and expiry, returning the claims.
    pub fn decode(&self, token: &str) -> Result<Map<String, JsonValue>, TokenError> {
        let (body, signature) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| TokenError::Malformed("missing signature".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed("signature is not base64url".to_string()))?;
        self.mac(body.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| TokenError::Malformed("signature mismatch".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::Malformed("claims are not base64url".to_string()))?;
        let claims: Map<String, JsonValue> = serde_json::from_slice(&payload)
            .map_err(|e| TokenError::Malformed(format!("claims are not a JSON object: {}", e)))?;

        let exp = claims
            .get("exp")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| TokenError::Malformed("missing exp claim".to_string()))?;
        if Utc::now().timestamp() > exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Token for a view link to one conflict, addressed to one admin.
    pub fn conflict_view_token(
        &self,
        conflict_id: i64,
        user_id: i64,
        username: &str,
    ) -> Result<String, TokenError> {
        let mut claims = Map::new();
        claims.insert("conflict_id".to_string(), JsonValue::from(conflict_id));
        claims.insert("user_id".to_string(), JsonValue::from(user_id));
        claims.insert("username".to_string(), JsonValue::from(username));
        claims.insert("type".to_string(), JsonValue::from(CONFLICT_VIEW));
        self.encode(claims)
    }

    pub fn decode_conflict_view(&self, token: &str) -> Result<ConflictViewClaims, TokenError> {
        let claims = self.decode(token)?;
        let claims: ConflictViewClaims = serde_json::from_value(JsonValue::Object(claims))
            .map_err(|e| TokenError::Malformed(format!("not a conflict view token: {}", e)))?;
        if claims.kind != CONFLICT_VIEW {
            return Err(TokenError::Malformed(format!(
                "unexpected token type '{}'",
                claims.kind
            )));
        }
        Ok(claims)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| TokenError::Malformed("invalid signing key".to_string()))?;
        mac.update(data);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret", Duration::hours(24))
    }

    #[test]
    fn test_conflict_view_token_roundtrip() {
        let token = codec().conflict_view_token(42, 7, "root").unwrap();
        let claims = codec().decode_conflict_view(&token).unwrap();
        assert_eq!(claims.conflict_id, 42);
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "root");
        assert_eq!(claims.kind, CONFLICT_VIEW);
        assert!(claims.exp > Utc::now().timestamp() + 23 * 3600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = TokenCodec::new("test-secret", Duration::hours(-1));
        let token = expired.conflict_view_token(1, 1, "root").unwrap();
        assert_eq!(codec().decode(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_tampered_token_is_malformed() {
        let token = codec().conflict_view_token(1, 1, "root").unwrap();
        let (body, signature) = token.split_once('.').unwrap();

        let mut claims: Map<String, JsonValue> =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(body).unwrap()).unwrap();
        claims.insert("conflict_id".to_string(), JsonValue::from(2));
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
            signature
        );
        assert!(matches!(codec().decode(&forged), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_wrong_secret_and_garbage_are_malformed() {
        let token = codec().conflict_view_token(1, 1, "root").unwrap();
        let other = TokenCodec::new("other-secret", Duration::hours(24));
        assert!(matches!(other.decode(&token), Err(TokenError::Malformed(_))));
        assert!(matches!(codec().decode("not-a-token"), Err(TokenError::Malformed(_))));
        assert!(matches!(codec().decode("a.b"), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_other_token_type_rejected() {
        let mut claims = Map::new();
        claims.insert("conflict_id".to_string(), JsonValue::from(1));
        claims.insert("user_id".to_string(), JsonValue::from(1));
        claims.insert("username".to_string(), JsonValue::from("root"));
        claims.insert("type".to_string(), JsonValue::from("password_reset"));
        let token = codec().encode(claims).unwrap();
        assert!(codec().decode(&token).is_ok());
        assert!(matches!(
            codec().decode_conflict_view(&token),
            Err(TokenError::Malformed(_))
        ));
    }
}
