//! Client-side reading of signed access tokens.
//!
//! The client never verifies signatures; the server does that on every
//! request. All the client needs is the subject and the expiry so it can
//! decide whether to refresh before talking to the API.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed token: expected 3 segments, found {0}")]
    Malformed(usize),

    #[error("Token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token is missing the '{0}' claim")]
    MissingClaim(&'static str),

    #[error("Token expiry out of range: {0}")]
    InvalidExpiry(i64),
}

/// Claims the client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    /// A token is usable only while its expiry is strictly in the future.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Reads claims out of an access token.
pub trait TokenCodec: Send + Sync {
    fn decode(&self, token: &str) -> Result<Claims, DecodeError>;
}

/// The expense server nests the user id under `userInfo` instead of `sub`.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<Value>,
    exp: Option<Value>,
    #[serde(rename = "userInfo")]
    user_info: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    id: Option<Value>,
}

/// Decoder for header.payload.signature tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtCodec;

impl JwtCodec {
    fn value_to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn value_to_seconds(value: &Value) -> Option<i64> {
        // Some issuers emit fractional or quoted expiry timestamps
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.floor() as i64)
                })
            }
            _ => None,
        }
    }
}

impl TokenCodec for JwtCodec {
    fn decode(&self, token: &str) -> Result<Claims, DecodeError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(DecodeError::Malformed(parts.len()));
        }

        let payload = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('='))?;
        let raw: RawClaims = serde_json::from_slice(&payload)?;

        let subject_id = raw
            .sub
            .as_ref()
            .and_then(Self::value_to_string)
            .or_else(|| {
                raw.user_info
                    .as_ref()
                    .and_then(|info| info.id.as_ref())
                    .and_then(Self::value_to_string)
            })
            .ok_or(DecodeError::MissingClaim("sub"))?;

        let exp = raw
            .exp
            .as_ref()
            .and_then(Self::value_to_seconds)
            .ok_or(DecodeError::MissingClaim("exp"))?;

        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or(DecodeError::InvalidExpiry(exp))?;

        Ok(Claims {
            subject_id,
            expires_at,
        })
    }
}

/// Build an unsigned token with the given JSON payload. Test helper shared
/// by the guard and store tests.
#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}
