//! Join token resolution and decoding
//!
//! A join token is either configured inline or fetched once from
//! `JOIN_TOKEN_URL`, whose JSON response carries it in `context`.
//! Federation tokens are base64-encoded JSON naming the master
//! (`{"s": server, "p": port, ...}`); decoding is informational only.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::JoinConfig;
use crate::error::CredentialError;

/// Opaque join credential
#[derive(Clone, PartialEq, Eq)]
pub struct JoinCredential(String);

impl JoinCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for JoinCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinCredential(<{} chars>)", self.0.len())
    }
}

/// Master endpoint recovered from a join token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCredential {
    pub server: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    s: Option<String>,
    p: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct TokenUrlResponse {
    context: Option<String>,
}

/// Decode a join token into the master server/port it names.
///
/// Any failure (base64, UTF-8, JSON, missing fields) yields `None`.
pub fn decode(credential: &JoinCredential) -> Option<DecodedCredential> {
    let bytes = match STANDARD.decode(credential.as_str().trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Join token is not base64");
            return None;
        }
    };
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "Join token is not UTF-8");
            return None;
        }
    };
    let claims: TokenClaims = match serde_json::from_str(&text) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Join token is not JSON");
            return None;
        }
    };

    match (claims.s, claims.p) {
        (Some(server), Some(port)) if !server.is_empty() && port != 0 => {
            Some(DecodedCredential { server, port })
        }
        _ => {
            debug!("Join token does not contain 's' or 'p' fields");
            None
        }
    }
}

/// Obtains the join credential for an enrollment sequence
pub struct TokenResolver {
    client: Client,
}

impl TokenResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Inline token if configured, otherwise one fetch from the token URL.
    pub async fn resolve(&self, config: &JoinConfig) -> Result<JoinCredential, CredentialError> {
        if let Some(token) = &config.join_token {
            info!("Using join token from environment variable");
            return Ok(JoinCredential::new(token.clone()));
        }

        match &config.join_token_url {
            Some(url) => {
                info!(url = %url, "Fetching join token from URL");
                self.fetch_from_url(url).await
            }
            None => Err(CredentialError::NoSource),
        }
    }

    async fn fetch_from_url(&self, url: &str) -> Result<JoinCredential, CredentialError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Failed to fetch join token");
            return Err(CredentialError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;
        let parsed: TokenUrlResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::InvalidJson(e.to_string()))?;

        match parsed.context.filter(|c| !c.is_empty()) {
            Some(token) => {
                info!(token_len = token.len(), "Successfully fetched join token from URL");
                Ok(JoinCredential::new(token))
            }
            None => Err(CredentialError::MissingContext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(json: &str) -> JoinCredential {
        JoinCredential::new(STANDARD.encode(json))
    }

    #[test]
    fn test_decode_round_trip() {
        let cases = [
            ("neuvector.example.com", 443u16, r#","t":"secret""#),
            ("cn-wukong-r2204a.mcd.store", 1, ""),
            ("master-01.fed-2.example.net", 65535, ""),
            ("192.168.8.209", 10443, r#","t":"Kh9ov/s8qErR0UQ=","x":[1,2]"#),
        ];
        for (server, port, extra) in cases {
            let json = format!(r#"{{"s":"{}","p":{}{}}}"#, server, port, extra);
            let decoded = decode(&encode(&json)).unwrap_or_else(|| panic!("failed to decode {}", json));
            assert_eq!(decoded, DecodedCredential { server: server.to_string(), port });
        }
    }

    #[test]
    fn test_decode_rejects_non_base64() {
        assert!(decode(&JoinCredential::new("test_token_value!")).is_none());
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(decode(&encode("plain text")).is_none());
    }

    #[test]
    fn test_decode_requires_both_fields() {
        assert!(decode(&encode(r#"{"s":"master.example.com"}"#)).is_none());
        assert!(decode(&encode(r#"{"p":443}"#)).is_none());
        assert!(decode(&encode(r#"{"s":"","p":443}"#)).is_none());
    }

    #[test]
    fn test_credential_debug_hides_value() {
        let credential = JoinCredential::new("abc");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("abc"));
        assert!(rendered.contains("3 chars"));
    }
}
