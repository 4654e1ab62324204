//! Configuration management for the AVALON sale SDK
//!
//! [`EnvironmentConfig`] gathers raw values from files and `AVALON_*` variables.
//! [`SaleConfig`] is the resolved form the client is built from.

pub mod env;
pub mod networks;

pub use env::{
    EnvironmentConfig, LoggingEnvConfig, NetworkEnvConfig, SaleEnvConfig, WalletEnvConfig,
};
pub use networks::{known_networks, network_name, DeploymentRegistry, SaleDeployment};

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct SaleConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Chain the endpoint is expected to serve
    pub chain_id: u64,
    /// Receipt polling cadence
    pub receipt_poll_interval: Duration,
    /// Receipt wait limit
    pub receipt_timeout: Duration,
    /// BIP-44 account index of the local signer
    pub account_index: u32,
    /// Signer mnemonic, when one is configured
    pub mnemonic: Option<Arc<SecretString>>,
    /// Tier that carries live chain data
    pub live_tier: String,
    /// Sale deployments by chain
    pub deployments: DeploymentRegistry,
}

impl SaleConfig {
    /// Load files and environment, validate, and resolve defaults
    pub fn load() -> Result<Self, Error> {
        let env_config = EnvironmentConfig::load()?;
        Self::from_env_config(&env_config)
    }

    pub fn from_env_config(env_config: &EnvironmentConfig) -> Result<Self, Error> {
        env_config.validate()?;
        Ok(Self {
            rpc_url: env_config.get_rpc_url(),
            chain_id: env_config.get_chain_id(),
            receipt_poll_interval: Duration::from_millis(env_config.get_receipt_poll_interval_ms()),
            receipt_timeout: Duration::from_secs(env_config.get_receipt_timeout_secs()),
            account_index: env_config.get_account_index(),
            mnemonic: env_config.wallet.mnemonic.clone(),
            live_tier: env_config.get_live_tier(),
            deployments: env_config.deployment_registry(),
        })
    }

    /// Display name of the configured chain
    pub fn network_name(&self) -> String {
        network_name(self.chain_id)
    }
}

impl Default for SaleConfig {
    fn default() -> Self {
        let env_config = EnvironmentConfig::default();
        Self {
            rpc_url: env_config.get_rpc_url(),
            chain_id: env_config.get_chain_id(),
            receipt_poll_interval: Duration::from_millis(env_config.get_receipt_poll_interval_ms()),
            receipt_timeout: Duration::from_secs(env_config.get_receipt_timeout_secs()),
            account_index: 0,
            mnemonic: None,
            live_tier: env_config.get_live_tier(),
            deployments: DeploymentRegistry::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolves_to_base_sepolia() {
        let config = SaleConfig::default();
        assert_eq!(config.chain_id, 84532);
        assert_eq!(config.network_name(), "Base Sepolia Testnet");
        assert_eq!(config.receipt_poll_interval, Duration::from_secs(2));
        assert!(config.mnemonic.is_none());
    }

    #[test]
    fn test_from_env_config_rejects_invalid() {
        let mut env_config = EnvironmentConfig::default();
        env_config.network.chain_id = Some(0);
        assert!(SaleConfig::from_env_config(&env_config).is_err());
    }
}
