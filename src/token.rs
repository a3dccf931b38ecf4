//! Access token inspection
//!
//! Credentials are issued out of band and validated by the backend. The
//! client only peeks at the payload to learn the identity and expiry; the
//! signature is never checked here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("token carries no identity grant")]
    MissingIdentity,
}

/// Claims carried by a messaging access token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessTokenClaims {
    /// API key that signed the token
    #[serde(default)]
    pub iss: Option<String>,
    /// Account the token belongs to
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry, seconds since the epoch
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub grants: Grants,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Grants {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub chat: Option<ChatGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatGrant {
    #[serde(default)]
    pub service_sid: Option<String>,
}

impl AccessTokenClaims {
    /// Decode the payload segment of a JWT without verifying it
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn identity(&self) -> Option<&str> {
        self.grants.identity.as_deref().filter(|i| !i.is_empty())
    }

    pub fn chat_service_sid(&self) -> Option<&str> {
        self.grants.chat.as_ref()?.service_sid.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp?, 0).single()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }
}

/// Identity claim of a token
pub fn identity_from_token(token: &str) -> Result<String, TokenError> {
    AccessTokenClaims::decode(token)?
        .identity()
        .map(str::to_string)
        .ok_or(TokenError::MissingIdentity)
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT","cty":"twilio-fpa;v=1"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_claims() {
        let token = encode_test_token(&json!({
            "iss": "SK123",
            "sub": "AC456",
            "exp": 1_700_000_000,
            "grants": {
                "identity": "email:demo-chat@example.com",
                "chat": { "service_sid": "IS789" }
            }
        }));

        let claims = AccessTokenClaims::decode(&token).unwrap();
        assert_eq!(claims.identity(), Some("email:demo-chat@example.com"));
        assert_eq!(claims.chat_service_sid(), Some("IS789"));
        assert_eq!(claims.sub.as_deref(), Some("AC456"));
        assert_eq!(claims.expires_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_expiry() {
        let token = encode_test_token(&json!({ "exp": 1_000, "grants": {} }));
        let claims = AccessTokenClaims::decode(&token).unwrap();
        assert!(claims.is_expired(Utc::now()));

        let no_exp = AccessTokenClaims::decode(&encode_test_token(&json!({}))).unwrap();
        assert!(!no_exp.is_expired(Utc::now()));
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            AccessTokenClaims::decode("<token>"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            AccessTokenClaims::decode("a.b.c.d"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            AccessTokenClaims::decode("a.!!!.c"),
            Err(TokenError::Encoding(_))
        ));
        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("nope"));
        assert!(matches!(
            AccessTokenClaims::decode(&not_json),
            Err(TokenError::Payload(_))
        ));
    }

    #[test]
    fn test_identity_from_token() {
        let token = encode_test_token(&json!({ "grants": { "identity": "alice" } }));
        assert_eq!(identity_from_token(&token).unwrap(), "alice");

        let anonymous = encode_test_token(&json!({ "grants": { "identity": "" } }));
        assert!(matches!(
            identity_from_token(&anonymous),
            Err(TokenError::MissingIdentity)
        ));
    }
}
