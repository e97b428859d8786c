//! Federation join orchestration
//!
//! Drives one enrollment sequence through:
//!
//! ```text
//! Idle -> Validating -> ResolvingCredential -> Requesting -> {Succeeded | Stopped | Exhausted}
//!                                              Requesting <-> Reauthenticating
//! ```
//!
//! The request body (including the generated cluster name) is built once and
//! resent unchanged. Only transient failures consume the retry budget; a
//! 401 triggers a re-login and an immediate resend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::naming::{generate_cluster_name, target_address};
use super::policy::{classify, Outcome, RetryPolicy};
use super::token::{decode, JoinCredential, TokenResolver};
use crate::auth::{error_message, AuthSession, Reauthenticate};
use crate::config::JoinConfig;
use crate::error::JoinError;

/// Controller endpoint accepting join requests
pub const JOIN_PATH: &str = "/v1/fed/join";

const BANNER: &str = "============================================================";

/// Callback address the master uses to reach this cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointRestInfo {
    pub server: String,
    pub port: u16,
}

/// Join request body sent to the controller
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub name: String,
    pub join_token: String,
    pub joint_rest_info: JointRestInfo,
}

impl std::fmt::Debug for JoinRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinRequest")
            .field("name", &self.name)
            .field("join_token", &format_args!("<{} chars>", self.join_token.len()))
            .field("joint_rest_info", &self.joint_rest_info)
            .finish()
    }
}

impl JoinRequest {
    /// Build the body for `name`.
    ///
    /// `joint_rest_info` uses the configured callback address when present,
    /// otherwise the master target address and join port.
    pub fn new(config: &JoinConfig, name: String, credential: JoinCredential) -> Self {
        let server = config
            .joint_rest_server
            .clone()
            .unwrap_or_else(|| target_address(config));
        let port = config.joint_rest_port.unwrap_or(config.join_port);

        Self {
            name,
            join_token: credential.into_inner(),
            joint_rest_info: JointRestInfo { server, port },
        }
    }
}

/// Result of one join POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResponse {
    /// The controller answered
    Status { code: u16, message: String },
    /// No response was received
    Transport(String),
}

impl JoinResponse {
    pub fn ok() -> Self {
        JoinResponse::Status {
            code: 200,
            message: "Success".to_string(),
        }
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        JoinResponse::Status {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            JoinResponse::Status { code, .. } => Some(*code),
            JoinResponse::Transport(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            JoinResponse::Status { message, .. } => message,
            JoinResponse::Transport(message) => message,
        }
    }
}

/// Sends join requests to the controller
#[async_trait]
pub trait JoinApi: Send + Sync {
    async fn submit_join(&self, request: &JoinRequest) -> JoinResponse;
}

#[async_trait]
impl JoinApi for AuthSession {
    async fn submit_join(&self, request: &JoinRequest) -> JoinResponse {
        info!(name = %request.name, url = %self.base_url(), "Sending join request");
        let response = match self.post_json(JOIN_PATH, request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Network error during join request");
                return JoinResponse::Transport(e.to_string());
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            info!(status = status.as_u16(), "Join request successful");
            return JoinResponse::ok();
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "Failed to read join response body");
                String::new()
            }
        };
        let message = error_message(&body);
        warn!(status = status.as_u16(), message = %message, "Join request failed");
        JoinResponse::status(status.as_u16(), message)
    }
}

/// Waits out the backoff between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Enrollment state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Idle,
    Validating,
    ResolvingCredential,
    Requesting,
    Reauthenticating,
    Succeeded,
    Stopped,
    Exhausted,
}

impl JoinState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JoinState::Succeeded | JoinState::Stopped | JoinState::Exhausted
        )
    }
}

/// Counters for one enrollment sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Retry-classified failures so far
    pub attempt_count: u32,
    pub requests_sent: u32,
    pub reauthentications: u32,
}

/// How an enrollment sequence ended
#[derive(Debug, Clone)]
pub struct JoinReport {
    pub state: JoinState,
    pub retry: RetryState,
    pub cluster_name: Option<String>,
    pub error: Option<JoinError>,
}

impl JoinReport {
    pub fn succeeded(&self) -> bool {
        self.state == JoinState::Succeeded
    }
}

/// Runs the join sequence for one [`JoinConfig`]
pub struct JoinOrchestrator<'a> {
    config: JoinConfig,
    tokens: TokenResolver,
    api: &'a dyn JoinApi,
    auth: &'a dyn Reauthenticate,
    sleeper: &'a dyn Sleeper,
    state: JoinState,
}

impl<'a> JoinOrchestrator<'a> {
    pub fn new(
        config: JoinConfig,
        tokens: TokenResolver,
        api: &'a dyn JoinApi,
        auth: &'a dyn Reauthenticate,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            tokens,
            api,
            auth,
            sleeper,
            state: JoinState::Idle,
        }
    }

    /// Orchestrator backed by a controller session and the tokio timer.
    pub fn for_session(
        config: JoinConfig,
        session: &'a AuthSession,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        let tokens = TokenResolver::new(session.http_client());
        Self::new(config, tokens, session, session, sleeper)
    }

    fn transition(&mut self, next: JoinState) {
        debug!(from = ?self.state, to = ?next, "Join state transition");
        self.state = next;
    }

    /// Run to a terminal state. Never panics on remote failures.
    pub async fn run(mut self) -> JoinReport {
        info!("{}", BANNER);
        info!("Starting federation join process...");
        info!("{}", BANNER);

        let mut retry = RetryState::default();

        self.transition(JoinState::Validating);
        if let Err(e) = self.config.validate() {
            warn!(reason = %e, "Configuration validation failed");
            return self.finish(JoinState::Stopped, retry, None, Some(e.into()));
        }

        self.transition(JoinState::ResolvingCredential);
        let credential = match self.tokens.resolve(&self.config).await {
            Ok(credential) => credential,
            Err(e) => {
                error!(error = %e, "Failed to fetch join token");
                return self.finish(JoinState::Stopped, retry, None, Some(e.into()));
            }
        };

        match decode(&credential) {
            Some(decoded) => info!(
                server = %decoded.server,
                port = decoded.port,
                "Join token targets master"
            ),
            None => warn!("Join token could not be decoded, continuing"),
        }

        let cluster_name = generate_cluster_name(&self.config.store_id);
        info!(cluster_name = %cluster_name, "Cluster name");
        let request = JoinRequest::new(&self.config, cluster_name.clone(), credential);

        let policy = RetryPolicy::from_config(&self.config);
        info!(
            max_retries = policy.max_retries,
            worst_case_wait_secs = policy.worst_case_wait().as_secs(),
            "Join retry budget"
        );

        let mut backoff_pending = false;
        let mut just_reauthenticated = false;
        let mut error: Option<JoinError> = None;

        self.transition(JoinState::Requesting);
        while !self.state.is_terminal() {
            match self.state {
                JoinState::Requesting => {
                    if backoff_pending {
                        let delay = policy.delay(retry.attempt_count - 1);
                        info!(
                            "Retry {}/{} after {} seconds...",
                            retry.attempt_count,
                            policy.max_retries,
                            delay.as_secs()
                        );
                        self.sleeper.sleep(delay).await;
                        backoff_pending = false;
                    }

                    retry.requests_sent += 1;
                    let response = self.api.submit_join(&request).await;

                    match classify(response.code()) {
                        Outcome::Success => self.transition(JoinState::Succeeded),
                        Outcome::Stop => {
                            warn!(
                                status = ?response.code(),
                                message = %response.message(),
                                "Stopping retry due to non-retryable error"
                            );
                            error = Some(JoinError::Rejected {
                                status: response.code().unwrap_or_default(),
                                message: response.message().to_string(),
                            });
                            self.transition(JoinState::Stopped);
                        }
                        Outcome::Reauthenticate if just_reauthenticated => {
                            warn!("Still unauthorized after re-authentication, stopping");
                            error = Some(JoinError::Rejected {
                                status: 401,
                                message: response.message().to_string(),
                            });
                            self.transition(JoinState::Stopped);
                        }
                        Outcome::Reauthenticate => {
                            info!("Authentication failed, will re-login");
                            self.transition(JoinState::Reauthenticating);
                        }
                        Outcome::Retry => {
                            just_reauthenticated = false;
                            retry.attempt_count += 1;
                            warn!(
                                status = ?response.code(),
                                message = %response.message(),
                                attempt = retry.attempt_count,
                                "Retryable error"
                            );
                            if retry.attempt_count > policy.max_retries {
                                warn!("Max retries ({}) reached", policy.max_retries);
                                error = Some(JoinError::Exhausted {
                                    max_retries: policy.max_retries,
                                });
                                self.transition(JoinState::Exhausted);
                            } else {
                                backoff_pending = true;
                            }
                        }
                    }
                }
                JoinState::Reauthenticating => match self.auth.refresh().await {
                    Ok(()) => {
                        info!("Re-authentication successful, retrying...");
                        retry.reauthentications += 1;
                        just_reauthenticated = true;
                        self.transition(JoinState::Requesting);
                    }
                    Err(e) => {
                        error!(error = %e, "Re-authentication failed, stopping");
                        error = Some(e.into());
                        self.transition(JoinState::Stopped);
                    }
                },
                // entered only before the request loop
                _ => break,
            }
        }

        let state = self.state;
        self.finish(state, retry, Some(cluster_name), error)
    }

    fn finish(
        mut self,
        state: JoinState,
        retry: RetryState,
        cluster_name: Option<String>,
        error: Option<JoinError>,
    ) -> JoinReport {
        self.transition(state);
        info!("{}", BANNER);
        if state == JoinState::Succeeded {
            info!("Federation join completed successfully!");
        } else {
            warn!(state = ?state, "Federation join failed, but exporter will continue running");
        }
        info!("{}", BANNER);

        JoinReport {
            state,
            retry,
            cluster_name,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JoinConfig {
        JoinConfig {
            store_id: "test123".to_string(),
            join_token: Some("test_token_value".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_falls_back_to_target_address() {
        let request = JoinRequest::new(
            &config(),
            "test123-abcDEF".to_string(),
            JoinCredential::new("test_token_value"),
        );
        assert_eq!(request.name, "test123-abcDEF");
        assert_eq!(request.join_token, "test_token_value");
        assert_eq!(request.joint_rest_info.server, "cn-wukong-rtest123.mcd.store");
        assert_eq!(request.joint_rest_info.port, 443);
    }

    #[test]
    fn test_request_uses_callback_address() {
        let config = JoinConfig {
            joint_rest_server: Some("192.168.1.100".to_string()),
            joint_rest_port: Some(10443),
            ..config()
        };
        let request = JoinRequest::new(&config, "n".to_string(), JoinCredential::new("t"));
        assert_eq!(
            request.joint_rest_info,
            JointRestInfo {
                server: "192.168.1.100".to_string(),
                port: 10443
            }
        );
    }

    #[test]
    fn test_request_wire_format() {
        let request = JoinRequest::new(&config(), "test123-x1y2z3".to_string(), JoinCredential::new("abc"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["name"], "test123-x1y2z3");
        assert_eq!(value["join_token"], "abc");
        assert_eq!(value["joint_rest_info"]["server"], "cn-wukong-rtest123.mcd.store");
        assert_eq!(value["joint_rest_info"]["port"], 443);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JoinState::Succeeded.is_terminal());
        assert!(JoinState::Stopped.is_terminal());
        assert!(JoinState::Exhausted.is_terminal());
        assert!(!JoinState::Requesting.is_terminal());
        assert!(!JoinState::Reauthenticating.is_terminal());
    }
}
