//! Error types for federation enrollment
//!
//! Every enrollment failure ends up in one of these enums. None of them is
//! fatal to the exporter process; the orchestrator logs and absorbs them.

use thiserror::Error;

/// Join configuration is incomplete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("PAAS_STORE_ID is required")]
    MissingStoreId,

    #[error("Either JOIN_TOKEN or JOIN_TOKEN_URL must be provided")]
    MissingToken,
}

/// Join token could not be obtained from the token URL
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("Network error while fetching token: {0}")]
    Network(String),

    #[error("Failed to fetch token, status code: {0}")]
    Status(u16),

    #[error("'context' field not found in response")]
    MissingContext,

    #[error("Failed to parse JSON response: {0}")]
    InvalidJson(String),

    #[error("No join token source configured")]
    NoSource,
}

/// Controller authentication errors
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Login rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Terminal reasons for a failed enrollment sequence
#[derive(Debug, Clone, Error)]
pub enum JoinError {
    #[error("Configuration validation failed: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to fetch join token: {0}")]
    Credential(#[from] CredentialError),

    #[error("Join rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Re-authentication failed: {0}")]
    Reauthentication(#[from] AuthError),

    #[error("Max retries ({max_retries}) reached")]
    Exhausted { max_retries: u32 },
}
