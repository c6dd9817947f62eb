//! Client for the randomness oracle.
//!
//! The oracle hands out an encrypted random draw plus a signature binding it
//! to the requesting executor. The protocol treats the payload as opaque and
//! forwards it to the settlement layer unchanged; a fresh draw is fetched
//! for every flip.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum OracleError {
    /// The transport failed before a response arrived
    Transport(String),
    /// The response body was not in the expected shape
    Decode(String),
}

impl Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Transport(reason) => write!(f, "Oracle transport error: {reason}"),
            OracleError::Decode(reason) => write!(f, "Malformed oracle response: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OraclePoint {
    pub x: String,
    pub y: String,
}

/// A single random draw: the oracle's ephemeral public key, the two
/// ciphertext limbs, and the oracle's signature over them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OracleResult {
    pub public_key: OraclePoint,
    pub cipher_text: Vec<String>,
    pub signature: String,
}

// the ciphertext limbs arrive as one comma-joined string
#[derive(Deserialize)]
struct WireResult {
    #[serde(rename = "publicKey")]
    public_key: OraclePoint,
    #[serde(rename = "cipherText")]
    cipher_text: String,
    signature: String,
}

/// Source of per-round randomness. The HTTP oracle implements it; tests
/// substitute a canned draw.
pub trait RandomnessOracle {
    fn random_number(
        &self,
        executor_address: &str,
    ) -> impl std::future::Future<Output = Result<OracleResult, OracleError>> + Send;
}

#[derive(Clone)]
pub struct OracleClient {
    http: reqwest::Client,
    base_url: String,
}

impl OracleClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        OracleClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl RandomnessOracle for OracleClient {
    async fn random_number(&self, executor_address: &str) -> Result<OracleResult, OracleError> {
        let url = format!("{}/randomNumber/{}", self.base_url, executor_address);
        tracing::debug!("Requesting randomness from {url}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let wire: WireResult = response
            .json()
            .await
            .map_err(|e| OracleError::Decode(e.to_string()))?;
        Ok(OracleResult {
            public_key: wire.public_key,
            cipher_text: wire.cipher_text.split(',').map(str::to_string).collect(),
            signature: wire.signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_result_splits_cipher_text() {
        let raw = r#"{
            "publicKey": {"x": "11", "y": "22"},
            "cipherText": "333,444",
            "signature": "sig"
        }"#;
        let wire: WireResult = serde_json::from_str(raw).unwrap();
        let result = OracleResult {
            public_key: wire.public_key,
            cipher_text: wire.cipher_text.split(',').map(str::to_string).collect(),
            signature: wire.signature,
        };
        assert_eq!(result.cipher_text, vec!["333".to_string(), "444".to_string()]);
        assert_eq!(result.public_key.x, "11");
    }
}
