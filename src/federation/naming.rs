//! Cluster name and master address derivation
//!
//! Pure functions; the only randomness is the cluster name suffix.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::JoinConfig;

/// Length of the random cluster name suffix
pub const CLUSTER_SUFFIX_LEN: usize = 6;

/// Template for deriving the master address from a store id.
///
/// Renders as `<prefix><store_id>.<domain>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTemplate {
    pub prefix: String,
    pub domain: String,
}

impl Default for AddressTemplate {
    fn default() -> Self {
        Self {
            prefix: "cn-wukong-r".to_string(),
            domain: "mcd.store".to_string(),
        }
    }
}

impl AddressTemplate {
    pub fn new(prefix: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            domain: domain.into(),
        }
    }

    pub fn render(&self, store_id: &str) -> String {
        format!("{}{}.{}", self.prefix, store_id, self.domain)
    }
}

/// Generate `<store_id>-XXXXXX` with an alphanumeric suffix.
///
/// Fresh on every call. Callers generate once per enrollment sequence.
pub fn generate_cluster_name(store_id: &str) -> String {
    generate_cluster_name_with(store_id, &mut rand::thread_rng())
}

pub fn generate_cluster_name_with<R: Rng + ?Sized>(store_id: &str, rng: &mut R) -> String {
    let suffix: String = (0..CLUSTER_SUFFIX_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();
    format!("{}-{}", store_id, suffix)
}

/// Master address: explicit `join_address` verbatim, else the template.
pub fn target_address(config: &JoinConfig) -> String {
    match &config.join_address {
        Some(address) => address.clone(),
        None => config.address_template.render(&config.store_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_cluster_name_format() {
        for _ in 0..50 {
            let name = generate_cluster_name("test123");
            assert!(name.starts_with("test123-"));
            assert_eq!(name.len(), "test123-".len() + CLUSTER_SUFFIX_LEN);
            let suffix = &name["test123-".len()..];
            assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_cluster_name_seeded_is_deterministic() {
        let a = generate_cluster_name_with("u2204a", &mut StdRng::seed_from_u64(7));
        let b = generate_cluster_name_with("u2204a", &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_derived_address() {
        let config = JoinConfig {
            store_id: "test123".to_string(),
            ..Default::default()
        };
        assert_eq!(target_address(&config), "cn-wukong-rtest123.mcd.store");
    }

    #[test]
    fn test_explicit_address_wins() {
        let config = JoinConfig {
            store_id: "test123".to_string(),
            join_address: Some("custom.master.com".to_string()),
            ..Default::default()
        };
        assert_eq!(target_address(&config), "custom.master.com");
    }

    #[test]
    fn test_custom_template() {
        let config = JoinConfig {
            store_id: "42".to_string(),
            ..Default::default()
        }
        .with_address_template(AddressTemplate::new("fed-", "example.net"));
        assert_eq!(target_address(&config), "fed-42.example.net");
    }
}
