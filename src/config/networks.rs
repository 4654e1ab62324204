use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Error;

/// Chains the front-end knows by name
const KNOWN_NETWORKS: &[(u64, &str)] = &[
    (1, "Ethereum Mainnet"),
    (3, "Ropsten Testnet"),
    (4, "Rinkeby Testnet"),
    (5, "Goerli Testnet"),
    (11155111, "Sepolia Testnet"),
    (137, "Polygon Mainnet"),
    (80001, "Polygon Mumbai"),
    (56, "Binance Smart Chain"),
    (97, "BSC Testnet"),
    (8453, "Base Mainnet"),
    (84532, "Base Sepolia Testnet"),
];

/// Display name for a chain id, or `Unknown Network (<id>)`
pub fn network_name(chain_id: u64) -> String {
    KNOWN_NETWORKS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Unknown Network ({})", chain_id))
}

/// All named chains, in table order
pub fn known_networks() -> impl Iterator<Item = (u64, &'static str)> {
    KNOWN_NETWORKS.iter().copied()
}

/// Sale and reward-token contracts deployed on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDeployment {
    /// Chain the contracts live on
    pub chain_id: u64,
    /// Sale contract (payable `buyTokens()`)
    pub sale: Address,
    /// Reward token being sold
    pub reward_token: Address,
    /// Reward token symbol for display
    #[serde(default = "default_reward_symbol")]
    pub reward_symbol: String,
    /// Native currency symbol for display
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
}

fn default_reward_symbol() -> String {
    "AVALON".to_string()
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

impl SaleDeployment {
    pub fn new(chain_id: u64, sale: Address, reward_token: Address) -> Self {
        Self {
            chain_id,
            sale,
            reward_token,
            reward_symbol: default_reward_symbol(),
            native_symbol: default_native_symbol(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.sale == Address::ZERO {
            return Err(Error::Config(format!(
                "Sale contract address for chain {} cannot be the zero address",
                self.chain_id
            )));
        }
        if self.reward_token == Address::ZERO {
            return Err(Error::Config(format!(
                "Reward token address for chain {} cannot be the zero address",
                self.chain_id
            )));
        }
        if self.sale == self.reward_token {
            return Err(Error::Config(format!(
                "Sale and reward token on chain {} share the address {:#x}",
                self.chain_id, self.sale
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SaleDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sale={:#x} token={:#x} ({})",
            network_name(self.chain_id),
            self.sale,
            self.reward_token,
            self.reward_symbol
        )
    }
}

/// Per-chain registry of sale deployments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentRegistry {
    deployments: HashMap<u64, SaleDeployment>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deployment, replacing any previous one for the same chain
    pub fn insert(&mut self, deployment: SaleDeployment) -> Result<(), Error> {
        deployment.validate()?;
        self.deployments.insert(deployment.chain_id, deployment);
        Ok(())
    }

    /// Deployment for a chain, if the sale runs there
    pub fn get(&self, chain_id: u64) -> Option<&SaleDeployment> {
        self.deployments.get(&chain_id)
    }

    /// Deployment for a chain, or [`Error::UnsupportedNetwork`]
    pub fn require(&self, chain_id: u64) -> Result<&SaleDeployment, Error> {
        self.get(chain_id).ok_or(Error::UnsupportedNetwork(chain_id))
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.deployments.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }
}

impl FromIterator<SaleDeployment> for DeploymentRegistry {
    fn from_iter<I: IntoIterator<Item = SaleDeployment>>(iter: I) -> Self {
        Self {
            deployments: iter.into_iter().map(|d| (d.chain_id, d)).collect(),
        }
    }
}
