//! nv-exporter: security platform metrics exporter
//!
//! At startup the exporter logs in to the controller and, when enabled,
//! enrolls its cluster into a federation managed by a remote master.
//!
//! - [`config`]: join parameters from the environment
//! - [`auth`]: controller session and bearer token
//! - [`federation`]: token resolution, join request and retry loop

pub mod auth;
pub mod config;
pub mod error;
pub mod federation;

pub use auth::{AuthSession, Reauthenticate};
pub use config::{resolve, Disabled, EnvSource, JoinConfig, ProcessEnv};
pub use error::{AuthError, ConfigError, CredentialError, JoinError};
pub use federation::{run_enrollment, JoinOrchestrator, JoinReport, JoinState};
