//! Controller authentication session
//!
//! Holds the bearer token shared by every authenticated controller call.
//! Only [`AuthSession::login`] (and [`Reauthenticate::refresh`]) writes the
//! token; refreshes are serialized so a token is never replaced twice
//! concurrently.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Header carrying the controller bearer token
pub const AUTH_HEADER: &str = "X-Auth-Token";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Capability to refresh an expired bearer token
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    async fn refresh(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    password: PasswordCredentials<'a>,
}

#[derive(Debug, Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Extract `message` from a JSON error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string())
}

/// Build the controller base URL from a `host:port` service endpoint.
///
/// Values that already carry a scheme are used as given.
pub fn controller_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

/// Authenticated session against the controller REST API
pub struct AuthSession {
    base_url: String,
    username: String,
    password: String,
    client: Client,
    token: RwLock<Option<String>>,
    refresh_lock: Mutex<()>,
}

impl AuthSession {
    /// Create an unauthenticated session. Certificate verification is
    /// disabled for every request made through this session.
    pub fn new(
        endpoint: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            base_url: controller_url(endpoint),
            username: username.into(),
            password: password.into(),
            client,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// HTTP client sharing this session's transport settings
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Log in and store the bearer token.
    pub async fn login(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;

        info!(url = %self.base_url, "Login to controller ...");
        let body = LoginRequest {
            password: PasswordCredentials {
                username: &self.username,
                password: &self.password,
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/auth", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if status != StatusCode::OK {
            let message = error_message(&text);
            warn!(status = status.as_u16(), message = %message, "Login rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: LoginResponse =
            serde_json::from_str(&text).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        *self.token.write().await = Some(parsed.token.token);
        debug!("Controller session token updated");
        Ok(())
    }

    /// Best-effort logout; the stored token is dropped either way.
    pub async fn logout(&self) {
        info!("Logout ...");
        let token = self.token.write().await.take();
        let Some(token) = token else {
            return;
        };
        let result = self
            .client
            .delete(format!("{}/v1/auth", self.base_url))
            .header(AUTH_HEADER, token)
            .send()
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Logout request failed");
        }
    }

    /// POST a JSON body to `path` with the current bearer token.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        let token = self.token.read().await.clone();
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(token) = token {
            request = request.header(AUTH_HEADER, token);
        }
        request.send().await
    }
}

#[async_trait]
impl Reauthenticate for AuthSession {
    async fn refresh(&self) -> Result<(), AuthError> {
        info!("Re-authenticating to controller...");
        self.login().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_url_adds_scheme() {
        assert_eq!(controller_url("192.168.8.209:10443"), "https://192.168.8.209:10443");
        assert_eq!(controller_url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
        assert_eq!(controller_url("https://ctrl.local"), "https://ctrl.local");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"code":4,"message":"duplicate name"}"#), "duplicate name");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
        assert_eq!(error_message(r#"{"code":4}"#), r#"{"code":4}"#);
    }

    #[test]
    fn test_new_session_is_unauthenticated() {
        let session = AuthSession::new("127.0.0.1:1", "admin", "admin").unwrap();
        assert_eq!(session.base_url(), "https://127.0.0.1:1");
        assert!(!tokio_test::block_on(session.is_authenticated()));
    }
}
