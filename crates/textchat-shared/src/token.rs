//! Strict parser for the claims carried in a bearer token.
//!
//! Tokens are JWTs: `header.payload.signature`, each segment base64url. Only
//! the payload is read; the signature is the server's business.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::error::TokenError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry in epoch seconds.
    pub exp: i64,
    pub identity: Option<String>,
    pub username: Option<String>,
}

#[derive(Deserialize)]
struct RawClaims {
    exp: Option<serde_json::Value>,
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl TokenClaims {
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::SegmentCount(segments.len()));
        }

        // Some issuers keep the base64 padding.
        let payload = segments[1].trim_end_matches('=');
        if payload.is_empty() {
            return Err(TokenError::Base64);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Base64)?;

        let raw: RawClaims =
            serde_json::from_slice(&bytes).map_err(|e| TokenError::Claims(e.to_string()))?;

        let exp = raw
            .exp
            .as_ref()
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or(TokenError::MissingExpiry)?;

        Ok(Self {
            exp,
            identity: raw.identity,
            username: raw.username,
        })
    }

    /// Expiry in epoch milliseconds.
    pub fn expires_at_ms(&self) -> i64 {
        self.exp.saturating_mul(1000)
    }

    /// The username the token was issued to: `identity`, else `username`.
    pub fn subject(&self) -> Option<&str> {
        self.identity
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.username.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Build an unsigned token around `claims`. Used by tests across the workspace.
#[doc(hidden)]
pub fn encode_unsigned(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_expiry_and_subject() {
        let token = encode_unsigned(&json!({"exp": 1_700_000_000, "identity": "alice"}));
        let claims = TokenClaims::parse(&token).unwrap();

        assert_eq!(claims.exp, 1_700_000_000);
        assert_eq!(claims.expires_at_ms(), 1_700_000_000_000);
        assert_eq!(claims.subject(), Some("alice"));
    }

    #[test]
    fn subject_falls_back_to_username() {
        let token = encode_unsigned(&json!({"exp": 1, "username": "bob"}));
        assert_eq!(TokenClaims::parse(&token).unwrap().subject(), Some("bob"));

        let token = encode_unsigned(&json!({"exp": 1, "identity": "", "username": "bob"}));
        assert_eq!(TokenClaims::parse(&token).unwrap().subject(), Some("bob"));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert_eq!(
            TokenClaims::parse("not-a-token"),
            Err(TokenError::SegmentCount(1))
        );
        assert_eq!(TokenClaims::parse("a.b"), Err(TokenError::SegmentCount(2)));
    }

    #[test]
    fn rejects_garbage_payload() {
        assert_eq!(TokenClaims::parse("a.!!!.c"), Err(TokenError::Base64));
        assert_eq!(TokenClaims::parse("a..c"), Err(TokenError::Base64));

        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
        assert!(matches!(
            TokenClaims::parse(&not_json),
            Err(TokenError::Claims(_))
        ));
    }

    #[test]
    fn rejects_missing_expiry() {
        let token = encode_unsigned(&json!({"identity": "alice"}));
        assert_eq!(TokenClaims::parse(&token), Err(TokenError::MissingExpiry));

        let token = encode_unsigned(&json!({"exp": "soon"}));
        assert_eq!(TokenClaims::parse(&token), Err(TokenError::MissingExpiry));
    }

    #[test]
    fn accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":50}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(TokenClaims::parse(&token).unwrap().exp, 50);
    }
}
