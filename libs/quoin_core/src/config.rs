//! Environment-driven configuration.
//!
//! Two networks are supported: `Local` (everything runs in-process or on
//! localhost, keys may be generated on the fly) and `Testnet` (the hosted
//! store, oracle and contract; all secrets must be supplied explicitly).

use std::{env, fmt::Display};

use quoin_crypto::{
    signing::{DefaultSigner, SigFunction},
    types::{self, StdByteArray},
};

use crate::net::{oracle::OracleClient, store::StoreClient};

pub const NETWORK_VAR: &str = "QUOIN_NETWORK";
pub const CONTRACT_ADDRESS_VAR: &str = "QUOIN_CONTRACT_ADDRESS";
pub const SNAPSHOT_SLOT_VAR: &str = "QUOIN_SNAPSHOT_SLOT";
pub const STORE_URL_VAR: &str = "QUOIN_STORE_URL";
pub const STORE_TOKEN_VAR: &str = "QUOIN_STORE_TOKEN";
pub const ORACLE_URL_VAR: &str = "QUOIN_ORACLE_URL";
pub const EXECUTOR_KEY_VAR: &str = "QUOIN_EXECUTOR_KEY";

// well-known testnet deployment
const TESTNET_CONTRACT_ADDRESS: &str =
    "5d1c9b7fa842cf2f383f1c984cb45e2a4f2f4cbbce6d8a9f50b2d01a7c1ce2a6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Local,
    Testnet,
}

impl Network {
    pub fn parse(value: &str) -> Option<Network> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Some(Network::Local),
            "testnet" => Some(Network::Testnet),
            _ => None,
        }
    }

    /// The snapshot namespace this network's ledgers live under.
    pub fn default_snapshot_slot(&self) -> &'static str {
        match self {
            Network::Local => "quoin-local",
            Network::Testnet => "quoin-testnet",
        }
    }

    fn default_contract_address(&self) -> StdByteArray {
        match self {
            // a local chain deploys the contract at a fixed address
            Network::Local => [9u8; 32],
            Network::Testnet => types::from_hex(TESTNET_CONTRACT_ADDRESS)
                .expect("Testnet contract address constant is valid hex"),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Local => write!(f, "local"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is not set for the selected network
    Missing(&'static str),
    /// A variable is set but could not be parsed
    Invalid(&'static str, String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "Missing required variable {var}"),
            ConfigError::Invalid(var, reason) => write!(f, "Invalid value for {var}: {reason}"),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub network: Network,
    pub contract_address: StdByteArray,
    pub snapshot_slot: String,
    pub store_url: String,
    pub store_token: String,
    pub oracle_url: String,
    executor_key: StdByteArray,
}

impl Config {
    /// Assemble the configuration from the environment.
    ///
    /// On `Local`, endpoints default to localhost and a missing executor key
    /// is generated fresh. On `Testnet`, the store URL, store token, oracle
    /// URL and executor key are all required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let network = match env::var(NETWORK_VAR) {
            Ok(value) => {
                Network::parse(&value).ok_or(ConfigError::Invalid(NETWORK_VAR, value))?
            }
            Err(_) => Network::Local,
        };
        tracing::info!("Configuring for network {network}");

        let contract_address = match env::var(CONTRACT_ADDRESS_VAR) {
            Ok(value) => types::from_hex(&value)
                .map_err(|e| ConfigError::Invalid(CONTRACT_ADDRESS_VAR, e.to_string()))?,
            Err(_) => network.default_contract_address(),
        };
        let snapshot_slot = env::var(SNAPSHOT_SLOT_VAR)
            .unwrap_or_else(|_| network.default_snapshot_slot().to_string());

        let store_url = required_or_local_default(
            network,
            STORE_URL_VAR,
            "http://127.0.0.1:8379",
        )?;
        let store_token =
            required_or_local_default(network, STORE_TOKEN_VAR, "local-dev-token")?;
        let oracle_url = required_or_local_default(
            network,
            ORACLE_URL_VAR,
            "http://127.0.0.1:3030/api",
        )?;

        let executor_key = match env::var(EXECUTOR_KEY_VAR) {
            Ok(value) => types::from_hex(&value)
                .map_err(|e| ConfigError::Invalid(EXECUTOR_KEY_VAR, e.to_string()))?,
            Err(_) => match network {
                Network::Local => {
                    tracing::debug!("No executor key supplied, generating one for local play");
                    DefaultSigner::generate_random().to_bytes()
                }
                Network::Testnet => return Err(ConfigError::Missing(EXECUTOR_KEY_VAR)),
            },
        };

        Ok(Config {
            network,
            contract_address,
            snapshot_slot,
            store_url,
            store_token,
            oracle_url,
            executor_key,
        })
    }

    pub fn store_client(&self) -> StoreClient {
        StoreClient::new(self.store_url.clone(), self.store_token.clone())
    }

    pub fn oracle_client(&self) -> OracleClient {
        OracleClient::new(self.oracle_url.clone())
    }

    pub fn executor_signer(&self) -> DefaultSigner {
        DefaultSigner::new(self.executor_key)
    }
}

fn required_or_local_default(
    network: Network,
    var: &'static str,
    local_default: &str,
) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) => Ok(value),
        Err(_) => match network {
            Network::Local => Ok(local_default.to_string()),
            Network::Testnet => Err(ConfigError::Missing(var)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env mutations are process-global; serialize the tests that touch them
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_network_parse() {
        assert_eq!(Network::parse("local"), Some(Network::Local));
        assert_eq!(Network::parse("TESTNET"), Some(Network::Testnet));
        assert_eq!(Network::parse("mainnet"), None);
    }

    #[test]
    fn test_local_defaults_need_no_environment() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var(NETWORK_VAR);
            env::remove_var(STORE_URL_VAR);
            env::remove_var(STORE_TOKEN_VAR);
            env::remove_var(ORACLE_URL_VAR);
            env::remove_var(EXECUTOR_KEY_VAR);
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.network, Network::Local);
        assert_eq!(config.snapshot_slot, "quoin-local");
        assert!(config.store_url.contains("127.0.0.1"));
    }

    #[test]
    fn test_testnet_requires_secrets() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var(NETWORK_VAR, "testnet");
            env::remove_var(STORE_URL_VAR);
            env::remove_var(STORE_TOKEN_VAR);
            env::remove_var(ORACLE_URL_VAR);
            env::remove_var(EXECUTOR_KEY_VAR);
        }
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing(_))));
        unsafe {
            env::remove_var(NETWORK_VAR);
        }
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var(NETWORK_VAR, "local");
            env::set_var(SNAPSHOT_SLOT_VAR, "quoin-ci");
            env::set_var(CONTRACT_ADDRESS_VAR, "11".repeat(32));
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.snapshot_slot, "quoin-ci");
        assert_eq!(config.contract_address, [0x11u8; 32]);
        unsafe {
            env::remove_var(NETWORK_VAR);
            env::remove_var(SNAPSHOT_SLOT_VAR);
            env::remove_var(CONTRACT_ADDRESS_VAR);
        }
    }
}
