//! Client for the identity provider's email/password account endpoints.
//!
//! Both endpoints take the same request body and return the same response
//! shape; only the path differs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthError;

use super::error::truncate_body;

// ============================================================================
// Constants
// ============================================================================

/// Base URL of the identity toolkit REST API
pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const SIGN_UP_ENDPOINT: &str = "signUp";
const SIGN_IN_ENDPOINT: &str = "signInWithPassword";

/// Successful account response.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub email: String,
    pub local_id: String,
    pub id_token: String,
    /// Token lifetime in seconds, sent as a decimal string.
    pub expires_in: String,
    #[serde(default)]
    pub registered: Option<bool>,
}

impl AuthResponse {
    /// Parsed token lifetime. Must be a positive, representable number of seconds.
    pub fn lifetime(&self) -> Result<chrono::Duration, AuthError> {
        self.expires_in
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| AuthError::unknown(format!("invalid expiresIn: {:?}", self.expires_in)))
    }
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResponse")
            .field("email", &self.email)
            .field("local_id", &self.local_id)
            .field("id_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("registered", &self.registered)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// The identity provider as seen by the session manager.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and return its first token.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError>;

    /// Verify a password and return a fresh token.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError>;
}

/// HTTP client for the identity toolkit.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl IdentityClient {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_base_url(DEFAULT_IDENTITY_BASE_URL, api_key)
    }

    /// Point the client somewhere other than the public endpoint.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post_credentials(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        let body = CredentialsRequest {
            email,
            password,
            return_secure_token: true,
        };

        debug!(endpoint, "Sending identity request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::unknown(format!("request to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::unknown(format!("failed to read {} response: {}", endpoint, e)))?;

        if status.is_success() {
            serde_json::from_str(&text)
                .map_err(|e| AuthError::unknown(format!("failed to parse {} response: {}", endpoint, e)))
        } else {
            let err = Self::error_from_body(&text);
            debug!(endpoint, status = %status, error = ?err, "Identity provider rejected request");
            Err(err)
        }
    }

    /// Map a failure body to an error, falling back to `Unknown` for anything
    /// without an `error.message` code.
    fn error_from_body(body: &str) -> AuthError {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope {
                error: Some(ErrorBody {
                    message: Some(code),
                }),
            }) => AuthError::from_code(&code),
            _ => AuthError::unknown(format!("unrecognised error body: {}", truncate_body(body))),
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        self.post_credentials(SIGN_UP_ENDPOINT, email, password).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        self.post_credentials(SIGN_IN_ENDPOINT, email, password).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_response() {
        let json = r#"{"kind":"identitytoolkit#VerifyPasswordResponse","localId":"U1","email":"a@x.com","displayName":"","idToken":"T1","registered":true,"refreshToken":"R1","expiresIn":"3600"}"#;
        let resp: AuthResponse = serde_json::from_str(json).expect("Failed to parse auth test JSON");
        assert_eq!(resp.email, "a@x.com");
        assert_eq!(resp.local_id, "U1");
        assert_eq!(resp.id_token, "T1");
        assert_eq!(resp.registered, Some(true));
        assert_eq!(resp.lifetime().unwrap(), chrono::Duration::seconds(3600));
    }

    #[test]
    fn test_bad_lifetime_is_unknown_error() {
        let json = r#"{"localId":"U1","email":"a@x.com","idToken":"T1","expiresIn":"soon"}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(resp.lifetime(), Err(AuthError::Unknown { .. })));
    }

    #[test]
    fn test_out_of_range_lifetime_is_unknown_error() {
        for expires_in in ["0", "-5", "100000000000000", "99999999999999999999"] {
            let json = format!(
                r#"{{"localId":"U1","email":"a@x.com","idToken":"T1","expiresIn":"{}"}}"#,
                expires_in
            );
            let resp: AuthResponse = serde_json::from_str(&json).unwrap();
            assert!(
                matches!(resp.lifetime(), Err(AuthError::Unknown { .. })),
                "expiresIn {} should be rejected",
                expires_in
            );
        }
    }

    #[test]
    fn test_error_from_body() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_EXISTS","errors":[]}}"#;
        assert_eq!(IdentityClient::error_from_body(body), AuthError::EmailExists);

        assert!(matches!(IdentityClient::error_from_body(""), AuthError::Unknown { .. }));
        assert!(matches!(IdentityClient::error_from_body(r#"{"error":{}}"#), AuthError::Unknown { .. }));
        assert!(matches!(IdentityClient::error_from_body("<html>502</html>"), AuthError::Unknown { .. }));
    }

    #[test]
    fn test_request_body_shape() {
        let body = CredentialsRequest {
            email: "a@x.com",
            password: "pw",
            return_secure_token: true,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, serde_json::json!({"email": "a@x.com", "password": "pw", "returnSecureToken": true}));
    }

    #[test]
    fn test_debug_redacts_id_token() {
        let json = r#"{"localId":"U1","email":"a@x.com","idToken":"very-secret","expiresIn":"3600"}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert!(!format!("{:?}", resp).contains("very-secret"));
    }
}
