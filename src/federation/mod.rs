//! Federation enrollment
//!
//! One best-effort attempt per process to register this cluster with the
//! federation master:
//! - Load and validate join configuration
//! - Resolve the join token (inline or from a URL)
//! - Submit the join request with capped exponential backoff
//!
//! Failures are logged and absorbed; the exporter keeps running either way.

pub mod join;
pub mod naming;
pub mod policy;
pub mod token;

pub use join::{
    JoinApi, JoinOrchestrator, JoinReport, JoinRequest, JoinResponse, JoinState, JointRestInfo,
    RetryState, Sleeper, TokioSleeper,
};
pub use naming::{generate_cluster_name, target_address, AddressTemplate};
pub use policy::{classify, Outcome, RetryPolicy};
pub use token::{decode, DecodedCredential, JoinCredential, TokenResolver};

use tracing::info;

use crate::auth::AuthSession;
use crate::config::{self, EnvSource};

/// Run enrollment if enabled. Returns whether the cluster joined.
pub async fn run_enrollment(env: &impl EnvSource, session: &AuthSession) -> bool {
    let config = match config::resolve(env) {
        Ok(config) => config,
        Err(config::Disabled) => {
            info!("Federation join is disabled");
            return false;
        }
    };

    info!(store_id = %config.store_id, "Federation join is enabled");
    let sleeper = TokioSleeper;
    let report = JoinOrchestrator::for_session(config, session, &sleeper)
        .run()
        .await;

    if let Some(e) = &report.error {
        info!(error = %e, "Federation join did not complete");
    }
    report.succeeded()
}
