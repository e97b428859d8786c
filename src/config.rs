//! Federation join configuration
//!
//! Join parameters come from a flat set of named values (normally the
//! process environment). Malformed numeric values never abort loading: they
//! are logged and replaced by their defaults. Semantic checks live in
//! [`JoinConfig::validate`] and run before any network activity.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::warn;

use crate::error::ConfigError;
use crate::federation::naming::AddressTemplate;

pub const ENV_ENABLE_FED_JOIN: &str = "ENABLE_FED_JOIN";
pub const ENV_PAAS_STORE_ID: &str = "PAAS_STORE_ID";
pub const ENV_JOIN_TOKEN: &str = "JOIN_TOKEN";
pub const ENV_JOIN_TOKEN_URL: &str = "JOIN_TOKEN_URL";
pub const ENV_JOIN_ADDRESS: &str = "JOIN_ADDRESS";
pub const ENV_JOIN_PORT: &str = "JOIN_PORT";
pub const ENV_JOINT_REST_SERVER: &str = "JOINT_REST_SERVER";
pub const ENV_JOINT_REST_PORT: &str = "JOINT_REST_PORT";
pub const ENV_MAX_JOIN_RETRIES: &str = "MAX_JOIN_RETRIES";
pub const ENV_JOIN_RETRY_INITIAL_DELAY: &str = "JOIN_RETRY_INITIAL_DELAY_SECS";
pub const ENV_JOIN_RETRY_MAX_DELAY: &str = "JOIN_RETRY_MAX_DELAY_SECS";

/// Source of named configuration values
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|v| v.to_string())
    }
}

/// Federation join is switched off; not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disabled;

/// Parameters for one enrollment sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    /// Always true for a resolved config; disabled configs never exist
    pub enabled: bool,
    /// Store identifier; prefix of the cluster name and input to the address template
    pub store_id: String,
    /// Inline join token, preferred over `join_token_url`
    pub join_token: Option<String>,
    /// URL returning `{"context": "<token>"}`, fetched once per sequence
    pub join_token_url: Option<String>,
    /// Explicit master address; derived from `store_id` when absent
    pub join_address: Option<String>,
    /// Master port (default 443)
    pub join_port: u16,
    /// Address the master uses to call back this cluster
    pub joint_rest_server: Option<String>,
    /// Callback port; `join_port` is sent when absent
    pub joint_rest_port: Option<u16>,
    /// Retry-classified failures tolerated before giving up (default 10)
    pub max_retries: u32,
    /// First backoff wait in seconds, doubled per retry (default 10)
    pub initial_retry_delay_secs: u64,
    /// Upper bound on any single backoff wait in seconds (default 300)
    pub max_retry_delay_secs: u64,
    /// Derives the master address as `<prefix><store_id>.<domain>` when
    /// `join_address` is absent; defaults to `cn-wukong-r<store_id>.mcd.store`
    pub address_template: AddressTemplate,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_id: String::new(),
            join_token: None,
            join_token_url: None,
            join_address: None,
            join_port: default_join_port(),
            joint_rest_server: None,
            joint_rest_port: None,
            max_retries: default_max_retries(),
            initial_retry_delay_secs: default_initial_retry_delay(),
            max_retry_delay_secs: default_max_retry_delay(),
            address_template: AddressTemplate::default(),
        }
    }
}

// Defaults
fn default_join_port() -> u16 { 443 }
fn default_max_retries() -> u32 { 10 }
fn default_initial_retry_delay() -> u64 { 10 }
fn default_max_retry_delay() -> u64 { 300 }

impl JoinConfig {
    /// Check that the config can drive a join attempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_id.is_empty() {
            return Err(ConfigError::MissingStoreId);
        }
        if self.join_token.is_none() && self.join_token_url.is_none() {
            return Err(ConfigError::MissingToken);
        }
        Ok(())
    }

    pub fn with_address_template(mut self, template: AddressTemplate) -> Self {
        self.address_template = template;
        self
    }
}

/// Load join parameters from `env`.
///
/// Returns [`Disabled`] when the enable flag is absent or falsy. The returned
/// config is not yet validated.
pub fn resolve(env: &impl EnvSource) -> Result<JoinConfig, Disabled> {
    let enabled = env
        .get(ENV_ENABLE_FED_JOIN)
        .map(|v| is_truthy(&v))
        .unwrap_or(false);
    if !enabled {
        return Err(Disabled);
    }

    Ok(JoinConfig {
        enabled,
        store_id: non_empty(env, ENV_PAAS_STORE_ID).unwrap_or_default(),
        join_token: non_empty(env, ENV_JOIN_TOKEN),
        join_token_url: non_empty(env, ENV_JOIN_TOKEN_URL),
        join_address: non_empty(env, ENV_JOIN_ADDRESS),
        join_port: parse_or(env, ENV_JOIN_PORT, default_join_port()),
        joint_rest_server: non_empty(env, ENV_JOINT_REST_SERVER),
        joint_rest_port: parse_optional(env, ENV_JOINT_REST_PORT),
        max_retries: parse_or(env, ENV_MAX_JOIN_RETRIES, default_max_retries()),
        initial_retry_delay_secs: parse_or(
            env,
            ENV_JOIN_RETRY_INITIAL_DELAY,
            default_initial_retry_delay(),
        ),
        max_retry_delay_secs: parse_or(env, ENV_JOIN_RETRY_MAX_DELAY, default_max_retry_delay()),
        address_template: AddressTemplate::default(),
    })
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn non_empty(env: &impl EnvSource, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(env: &impl EnvSource, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    let Some(raw) = non_empty(env, key) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, default = %default, "Invalid value, using default");
            default
        }
    }
}

fn parse_optional<T: FromStr>(env: &impl EnvSource, key: &str) -> Option<T> {
    let raw = non_empty(env, key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Invalid value, ignoring");
            None
        }
    }
}
