//! Configuration management for the crossflow client
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::chain::ExecutionFamily;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiConfig,
    pub wallet: WalletConfig,
    pub polling: PollingConfig,
    pub transfer: TransferConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub quote_endpoint: String,
    pub status_endpoint: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the EVM private key (hex)
    pub evm_private_key_env: String,
    /// Environment variable holding the Solana secret key (base58)
    pub svm_private_key_env: String,
    /// Environment variable holding the Aptos ed25519 private key (hex)
    pub mvm_private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub transient_delay_ms: u64,
}

/// The single transfer this invocation will execute
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub source_chain_id: u32,
    pub target_chain_id: u32,
    /// Minor-unit amount as a decimal string, passed through verbatim
    pub amount: String,
    /// Token symbol looked up in both chains' token tables
    pub token: String,
    /// Defaults to the local address on the target chain
    pub recipient: Option<String>,
    /// Optional quote mode, e.g. "ExactOut"
    pub swap_mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u32,
    pub name: String,
    pub family: ExecutionFamily,
    pub rpc_url: String,
    pub native_currency: NativeCurrency,
    /// Default legacy gas price in wei (EVM chains only)
    pub gas_price: Option<String>,
    #[serde(default)]
    pub tokens: HashMap<String, TokenConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("CROSSFLOW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            anyhow::bail!("At least one chain must be configured");
        }

        for (name, chain) in &self.chains {
            if chain.rpc_url.is_empty() {
                anyhow::bail!("Chain {} has no RPC URL configured", name);
            }
        }

        if self.get_chain_by_id(self.transfer.source_chain_id).is_none() {
            anyhow::bail!(
                "Source chain {} is not configured",
                self.transfer.source_chain_id
            );
        }
        if self.get_chain_by_id(self.transfer.target_chain_id).is_none() {
            anyhow::bail!(
                "Target chain {} is not configured",
                self.transfer.target_chain_id
            );
        }

        if self.polling.max_attempts == 0 {
            anyhow::bail!("polling.max_attempts must be at least 1");
        }

        Ok(())
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u32) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
