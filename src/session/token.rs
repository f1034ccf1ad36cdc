//! Local inspection of bearer tokens.
//!
//! Only the `exp` claim is read. The signature is not checked; the backend
//! is the authority, this just avoids a round-trip for a token that is
//! already dead.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    NotJwt,
    #[error("token payload is not valid base64url: {0}")]
    Encoding(String),
    #[error("token payload is not valid JSON: {0}")]
    Payload(String),
    #[error("token exp claim is out of range: {0}")]
    ExpiryOutOfRange(i64),
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Decode the `exp` claim. `Ok(None)` means the token never expires.
pub fn decode_expiry(token: &str) -> Result<Option<DateTime<Utc>>, TokenError> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::NotJwt);
    };

    let raw = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::Encoding(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&raw).map_err(|e| TokenError::Payload(e.to_string()))?;

    claims
        .exp
        .map(|exp| DateTime::from_timestamp(exp, 0).ok_or(TokenError::ExpiryOutOfRange(exp)))
        .transpose()
}

/// A token is expired once `now` reaches its `exp`.
pub fn is_expired(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiry.is_some_and(|exp| exp <= now)
}

#[cfg(test)]
pub(crate) fn encode_test_token(exp: Option<i64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = match exp {
        Some(exp) => serde_json::json!({"sub": "42", "exp": exp}),
        None => serde_json::json!({"sub": "42"}),
    };
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{header}.{payload}.signature")
}
