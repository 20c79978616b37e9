//! Failures talking to the expense server.
//!
//! GraphQL reports most problems inside a 200 response, so the HTTP status
//! only covers transport-level trouble. Errors found in the response body
//! become [`ApiError::GraphQl`]; a payload whose `status` flag is false
//! becomes [`ApiError::Rejected`].

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// 403 from the gateway in front of the GraphQL endpoint
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// 401 before the resolver ran, usually a bad bearer token
    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    /// Endpoint URL points nowhere
    #[error("Endpoint not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Body was not a GraphQL envelope or lacked the requested field
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Messages from the envelope's `errors` array
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// Login or refresh answered with `status: false`
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Bodies longer than this are cut before they end up in logs
const MAX_ERROR_BODY_BYTES: usize = 500;

fn clip_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_BYTES {
        return body.to_string();
    }
    let end = (0..=MAX_ERROR_BODY_BYTES)
        .rev()
        .find(|&i| body.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

impl ApiError {
    /// Map a non-success status whose body carried no GraphQL errors
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            StatusCode::FORBIDDEN => ApiError::AccessDenied(clip_body(body)),
            StatusCode::NOT_FOUND => ApiError::NotFound(clip_body(body)),
            s if s.is_server_error() => ApiError::ServerError(clip_body(body)),
            s => ApiError::InvalidResponse(format!("Status {}: {}", s, clip_body(body))),
        }
    }

    /// Join the messages of a GraphQL `errors` array
    pub fn from_graphql(messages: &[String]) -> Self {
        if messages.is_empty() {
            ApiError::GraphQl("unknown error".to_string())
        } else {
            ApiError::GraphQl(messages.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down"),
            ApiError::ServerError(ref body) if body == "upstream down"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, ""),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "é".repeat(400); // 800 bytes, multi-byte chars
        match ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            ApiError::ServerError(msg) => {
                assert!(msg.contains("truncated, 800 total bytes"));
                assert!(msg.len() < body.len());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_graphql_joins_messages() {
        let err = ApiError::from_graphql(&["Invalid token".to_string(), "Expired".to_string()]);
        assert_eq!(err.to_string(), "GraphQL error: Invalid token; Expired");
        assert_eq!(
            ApiError::from_graphql(&[]).to_string(),
            "GraphQL error: unknown error"
        );
    }
}
