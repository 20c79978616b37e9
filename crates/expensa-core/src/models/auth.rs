use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Payload of both the login and the refresh mutations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub status: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl LoginResponse {
    /// The credential pair, if the server accepted the request
    pub fn into_token_pair(self) -> Option<TokenPair> {
        if !self.status {
            return None;
        }
        match (self.token, self.refresh_token) {
            (Some(access_token), Some(refresh_token))
                if !access_token.is_empty() && !refresh_token.is_empty() =>
            {
                Some(TokenPair {
                    access_token,
                    refresh_token,
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// Tokens are credentials; keep them out of logs
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{"status": true, "token": "a.b.c", "refreshToken": "r-1"}"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        let pair = resp.into_token_pair().expect("accepted login has a pair");
        assert_eq!(pair.access_token, "a.b.c");
        assert_eq!(pair.refresh_token, "r-1");
    }

    #[test]
    fn test_rejected_login_has_no_pair() {
        let json = r#"{"status": false, "token": null, "refreshToken": null}"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_token_pair().is_none());

        // Accepted but missing a token is still unusable
        let json = r#"{"status": true, "token": "a.b.c"}"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_token_pair().is_none());

        let json = r#"{"status": false}"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_token_pair().is_none());
    }

    #[test]
    fn test_register_request_wire_names() {
        let req = RegisterRequest {
            user_name: "sam".to_string(),
            email: "sam@example.com".to_string(),
            password: "pw".to_string(),
            confirm_password: "pw".to_string(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["userName"], "sam");
        assert_eq!(value["confirmPassword"], "pw");
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let pair = TokenPair {
            access_token: "secret-a".to_string(),
            refresh_token: "secret-r".to_string(),
        };
        let shown = format!("{:?}", pair);
        assert!(!shown.contains("secret-a"));
        assert!(!shown.contains("secret-r"));
    }
}
