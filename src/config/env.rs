use config::{Config as ConfigLoader, File, FileFormat};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::networks::{DeploymentRegistry, SaleDeployment};
use crate::error::Error;

/// Environment variable prefixes for the configuration sections
const ENV_NETWORK_PREFIX: &str = "AVALON_NETWORK";
const ENV_WALLET_PREFIX: &str = "AVALON_WALLET";
const ENV_SALE_PREFIX: &str = "AVALON_SALE";
const ENV_LOG_PREFIX: &str = "AVALON_LOG";

/// Default network: Base Sepolia through its public endpoint
pub const DEFAULT_CHAIN_ID: u64 = 84532;
pub const DEFAULT_RPC_URL: &str = "https://sepolia.base.org";
pub const DEFAULT_RECEIPT_POLL_MS: u64 = 2_000;
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LIVE_TIER: &str = "A";

/// Configuration file names, in order of preference
const CONFIG_FILES: &[&str] = &["avalon.toml", "avalon.json", "config.toml"];

/// Network configuration loaded from environment/files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkEnvConfig {
    /// EVM JSON-RPC endpoint
    pub rpc_url: Option<String>,
    /// Expected chain id of the endpoint
    pub chain_id: Option<u64>,
    /// Interval between receipt polls while awaiting finality
    pub receipt_poll_interval_ms: Option<u64>,
    /// Give up waiting for a receipt after this long
    pub receipt_timeout_secs: Option<u64>,
}

/// Wallet configuration. The mnemonic itself only ever comes from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletEnvConfig {
    /// BIP-44 account index (`m/44'/60'/0'/0/<index>`)
    pub account_index: Option<u32>,
    #[serde(skip)]
    pub mnemonic: Option<Arc<SecretString>>,
}

/// Sale configuration from environment/files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleEnvConfig {
    /// Tier that carries live chain data
    pub live_tier: Option<String>,
    /// Known deployments, one per chain
    #[serde(default)]
    pub deployments: Vec<SaleDeployment>,
}

/// Logging configuration from environment/files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingEnvConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: Option<String>,
}

/// Complete environment configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub network: NetworkEnvConfig,
    #[serde(default)]
    pub wallet: WalletEnvConfig,
    #[serde(default)]
    pub sale: SaleEnvConfig,
    #[serde(default)]
    pub logging: LoggingEnvConfig,
    /// Configuration file paths that were loaded
    #[serde(skip)]
    pub loaded_files: Vec<String>,
}

impl EnvironmentConfig {
    /// Load configuration from files in the standard search paths, then the
    /// process environment, then validate.
    pub fn load() -> Result<Self, Error> {
        let mut env_config = Self::default();
        for dir in Self::search_paths() {
            env_config.load_from_dir(&dir)?;
        }
        env_config.apply_env(env::vars())?;
        env_config.validate()?;
        Ok(env_config)
    }

    /// Directories searched for configuration files, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(dir) = env::var("AVALON_CONFIG_DIR") {
            paths.push(PathBuf::from(dir));
        }
        paths.push(PathBuf::from("config"));
        paths.push(PathBuf::from("."));
        if let Some(mut dir) = dirs::config_dir() {
            dir.push("avalon-sale");
            paths.push(dir);
        }
        paths
    }

    /// Load every known configuration file present in `dir`.
    ///
    /// Values already set win over values from later files.
    pub fn load_from_dir(&mut self, dir: &Path) -> Result<(), Error> {
        for name in CONFIG_FILES {
            let file_path = dir.join(name);
            if file_path.exists() {
                self.load_config_file(&file_path)?;
                self.loaded_files
                    .push(file_path.to_string_lossy().to_string());
            }
        }
        Ok(())
    }

    /// Load a specific configuration file
    pub fn load_config_file(&mut self, file_path: &Path) -> Result<(), Error> {
        let file_format = match file_path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };

        let settings = ConfigLoader::builder()
            .add_source(File::from(file_path).format(file_format))
            .build()
            .map_err(|e| Error::Config(format!("Failed to load config file: {}", e)))?;

        if let Ok(network) = settings.get::<NetworkEnvConfig>("network") {
            self.merge_network_config(network);
        }
        if let Ok(wallet) = settings.get::<WalletEnvConfig>("wallet") {
            if self.wallet.account_index.is_none() {
                self.wallet.account_index = wallet.account_index;
            }
        }
        match settings.get::<SaleEnvConfig>("sale") {
            Ok(sale) => self.merge_sale_config(sale),
            Err(config::ConfigError::NotFound(_)) => {}
            Err(e) => {
                return Err(Error::Config(format!(
                    "Invalid [sale] section in {}: {}",
                    file_path.display(),
                    e
                )))
            }
        }
        if let Ok(logging) = settings.get::<LoggingEnvConfig>("logging") {
            if self.logging.level.is_none() {
                self.logging.level = logging.level;
            }
        }

        Ok(())
    }

    /// Apply `AVALON_*` variables. Environment values override file values.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut sale_address = None;
        let mut reward_token = None;
        let mut reward_symbol = None;

        for (key, value) in vars {
            let Some(field) = key.strip_prefix("AVALON_") else {
                continue;
            };
            match field {
                "NETWORK_RPC_URL" => self.network.rpc_url = Some(value),
                "NETWORK_CHAIN_ID" => {
                    self.network.chain_id = Some(parse_env(&key, &value)?);
                }
                "NETWORK_RECEIPT_POLL_MS" => {
                    self.network.receipt_poll_interval_ms = Some(parse_env(&key, &value)?);
                }
                "NETWORK_RECEIPT_TIMEOUT_SECS" => {
                    self.network.receipt_timeout_secs = Some(parse_env(&key, &value)?);
                }
                "WALLET_MNEMONIC" => {
                    if !value.trim().is_empty() {
                        self.wallet.mnemonic = Some(Arc::new(SecretString::new(value)));
                    }
                }
                "WALLET_ACCOUNT_INDEX" => {
                    self.wallet.account_index = Some(parse_env(&key, &value)?);
                }
                "SALE_ADDRESS" => sale_address = Some(parse_env(&key, &value)?),
                "SALE_REWARD_TOKEN" => reward_token = Some(parse_env(&key, &value)?),
                "SALE_REWARD_SYMBOL" => reward_symbol = Some(value),
                "SALE_LIVE_TIER" => self.sale.live_tier = Some(value),
                "LOG_LEVEL" => self.logging.level = Some(value.to_ascii_lowercase()),
                _ => {}
            }
        }

        // A sale/token pair from the environment is a deployment on the configured chain
        match (sale_address, reward_token) {
            (Some(sale), Some(token)) => {
                let mut deployment = SaleDeployment::new(self.get_chain_id(), sale, token);
                if let Some(symbol) = reward_symbol {
                    deployment.reward_symbol = symbol;
                }
                self.sale
                    .deployments
                    .retain(|d| d.chain_id != deployment.chain_id);
                self.sale.deployments.push(deployment);
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(format!(
                    "{}_ADDRESS and {}_REWARD_TOKEN must be set together",
                    ENV_SALE_PREFIX, ENV_SALE_PREFIX
                )))
            }
        }

        Ok(())
    }

    fn merge_network_config(&mut self, file_config: NetworkEnvConfig) {
        if self.network.rpc_url.is_none() {
            self.network.rpc_url = file_config.rpc_url;
        }
        if self.network.chain_id.is_none() {
            self.network.chain_id = file_config.chain_id;
        }
        if self.network.receipt_poll_interval_ms.is_none() {
            self.network.receipt_poll_interval_ms = file_config.receipt_poll_interval_ms;
        }
        if self.network.receipt_timeout_secs.is_none() {
            self.network.receipt_timeout_secs = file_config.receipt_timeout_secs;
        }
    }

    fn merge_sale_config(&mut self, file_config: SaleEnvConfig) {
        if self.sale.live_tier.is_none() {
            self.sale.live_tier = file_config.live_tier;
        }
        for deployment in file_config.deployments {
            if !self
                .sale
                .deployments
                .iter()
                .any(|d| d.chain_id == deployment.chain_id)
            {
                self.sale.deployments.push(deployment);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(ref rpc_url) = self.network.rpc_url {
            if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "{}_RPC_URL must start with http:// or https://",
                    ENV_NETWORK_PREFIX
                )));
            }
        }
        if self.network.chain_id == Some(0) {
            return Err(Error::Config("Chain ID must be greater than 0".to_string()));
        }
        if self.network.receipt_poll_interval_ms == Some(0) {
            return Err(Error::Config(
                "Receipt poll interval must be greater than 0".to_string(),
            ));
        }
        if self.network.receipt_timeout_secs == Some(0) {
            return Err(Error::Config(
                "Receipt timeout must be greater than 0".to_string(),
            ));
        }
        if let Some(ref tier) = self.sale.live_tier {
            if tier.trim().is_empty() {
                return Err(Error::Config("Live tier id cannot be empty".to_string()));
            }
        }
        for deployment in &self.sale.deployments {
            deployment.validate()?;
        }
        if let Some(ref level) = self.logging.level {
            let valid_levels = ["error", "warn", "info", "debug", "trace"];
            if !valid_levels.contains(&level.as_str()) {
                return Err(Error::Config(format!(
                    "Invalid {}_LEVEL '{}'. Must be one of: {:?}",
                    ENV_LOG_PREFIX, level, valid_levels
                )));
            }
        }
        if self.wallet.account_index.map_or(false, |i| i >= 0x8000_0000) {
            return Err(Error::Config(format!(
                "{}_ACCOUNT_INDEX must be a non-hardened index",
                ENV_WALLET_PREFIX
            )));
        }
        Ok(())
    }

    /// Save configuration to file. The mnemonic is never written.
    pub fn save_to_file(&self, file_path: &Path) -> Result<(), Error> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(file_path, content)?;
        Ok(())
    }

    pub fn get_rpc_url(&self) -> String {
        self.network
            .rpc_url
            .clone()
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string())
    }

    pub fn get_chain_id(&self) -> u64 {
        self.network.chain_id.unwrap_or(DEFAULT_CHAIN_ID)
    }

    pub fn get_receipt_poll_interval_ms(&self) -> u64 {
        self.network
            .receipt_poll_interval_ms
            .unwrap_or(DEFAULT_RECEIPT_POLL_MS)
    }

    pub fn get_receipt_timeout_secs(&self) -> u64 {
        self.network
            .receipt_timeout_secs
            .unwrap_or(DEFAULT_RECEIPT_TIMEOUT_SECS)
    }

    pub fn get_account_index(&self) -> u32 {
        self.wallet.account_index.unwrap_or(0)
    }

    pub fn get_live_tier(&self) -> String {
        self.sale
            .live_tier
            .clone()
            .unwrap_or_else(|| DEFAULT_LIVE_TIER.to_string())
    }

    pub fn get_log_level(&self) -> String {
        self.logging
            .level
            .clone()
            .unwrap_or_else(|| "info".to_string())
    }

    /// Deployment registry built from the `sale.deployments` entries
    pub fn deployment_registry(&self) -> DeploymentRegistry {
        self.sale.deployments.iter().cloned().collect()
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", key, e)))
}
