//! Outcome classification and retry backoff
//!
//! Both are pure; the join loop in [`super::join`] is the only caller that
//! acts on them.

use std::time::Duration;

use crate::config::JoinConfig;

/// What the join loop does after one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Permanent rejection, no further attempts
    Stop,
    /// Bearer token expired; re-login and resend without consuming a retry
    Reauthenticate,
    /// Transient failure; back off and resend
    Retry,
}

/// Classify a join response. `None` means no response was received.
pub fn classify(status: Option<u16>) -> Outcome {
    match status {
        Some(200) => Outcome::Success,
        Some(400) | Some(409) => Outcome::Stop,
        Some(401) => Outcome::Reauthenticate,
        Some(code) if code >= 500 => Outcome::Retry,
        None => Outcome::Retry,
        // unclassified codes are retried
        Some(_) => Outcome::Retry,
    }
}

/// Capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &JoinConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay_secs: config.initial_retry_delay_secs,
            max_delay_secs: config.max_retry_delay_secs,
        }
    }

    /// `min(initial * 2^n, max)` where `n` counts earlier retry waits.
    pub fn delay_secs(&self, n: u32) -> u64 {
        let factor = 1u64.checked_shl(n).unwrap_or(u64::MAX);
        self.initial_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs)
    }

    pub fn delay(&self, n: u32) -> Duration {
        Duration::from_secs(self.delay_secs(n))
    }

    /// Total time spent sleeping if every attempt is retried.
    pub fn worst_case_wait(&self) -> Duration {
        let total = (0..self.max_retries)
            .map(|n| self.delay_secs(n))
            .fold(0u64, u64::saturating_add);
        Duration::from_secs(total)
    }
}
