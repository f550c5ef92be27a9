//! Chain module - execution families, registry, and per-family clients
//!
//! This module provides:
//! - The execution-family model (EVM, SVM, MVM)
//! - A static registry from aggregator chain IDs to chain metadata
//! - A `ChainClient` capability (address, sign, send-and-confirm) with one
//!   implementation per family, built once from local key material

pub mod evm;
pub mod mvm;
pub mod svm;

pub use evm::EvmClient;
pub use mvm::MvmClient;
pub use svm::SvmClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::api::types::TransactionPlan;
use crate::config::{ChainConfig, Settings, TokenConfig};
use crate::error::{TransferError, TransferResult};

/// Virtual-machine family a chain executes under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionFamily {
    /// Account/balance chains: {to, data, value} calls with ordered nonces
    #[serde(rename = "EVM")]
    Evm,
    /// Instruction chains: pre-built transaction blobs cosigned by the submitter
    #[serde(rename = "SVM")]
    Svm,
    /// Module chains: entry-function invocations against published modules
    #[serde(rename = "MVM")]
    Mvm,
}

impl fmt::Display for ExecutionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFamily::Evm => write!(f, "EVM"),
            ExecutionFamily::Svm => write!(f, "SVM"),
            ExecutionFamily::Mvm => write!(f, "MVM"),
        }
    }
}

/// Signature over a server-issued challenge, in the family's native scheme.
///
/// `public_key` is set exactly when the verifier cannot recover the signer
/// from the signature alone (MVM).
#[derive(Debug, Clone)]
pub struct AuthProof {
    pub signature: String,
    pub public_key: Option<String>,
}

/// Per-chain capability: local address, challenge signing, and confirmed
/// transaction submission. One implementation per execution family.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Execution family this client serves
    fn family(&self) -> ExecutionFamily;

    /// Local signer address in the chain's canonical text form
    fn address(&self) -> String;

    /// Sign a challenge message with the family's native scheme
    async fn sign_message(&self, message: &str) -> TransferResult<AuthProof>;

    /// Submit a plan and return only after on-chain confirmation
    async fn send_and_confirm(&self, plan: &TransactionPlan) -> TransferResult<String>;
}

/// Static lookup from aggregator chain ID to chain metadata
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: HashMap<u32, ChainConfig>,
}

impl ChainRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        let chains = settings
            .chains
            .values()
            .map(|c| (c.chain_id, c.clone()))
            .collect();
        Self { chains }
    }

    pub fn get(&self, chain_id: u32) -> TransferResult<&ChainConfig> {
        self.chains
            .get(&chain_id)
            .ok_or(TransferError::ChainNotFound { chain_id })
    }

    pub fn family(&self, chain_id: u32) -> TransferResult<ExecutionFamily> {
        Ok(self.get(chain_id)?.family)
    }

    #[cfg(test)]
    pub fn with_chains(chains: Vec<ChainConfig>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
        }
    }

    /// Token entry by symbol on a given chain
    pub fn token(&self, chain_id: u32, symbol: &str) -> TransferResult<&TokenConfig> {
        let chain = self.get(chain_id)?;
        chain.tokens.get(symbol).ok_or_else(|| {
            TransferError::Config(format!(
                "Token {} not configured on chain {} ({})",
                symbol, chain_id, chain.name
            ))
        })
    }
}

/// Holds connected chain clients, keyed by chain ID
pub struct ChainManager {
    clients: HashMap<u32, Arc<dyn ChainClient>>,
}

impl ChainManager {
    /// Connect clients for the given chain IDs, loading key material from
    /// the environment variables named in the wallet config.
    pub async fn connect(
        settings: &Settings,
        registry: &ChainRegistry,
        chain_ids: &[u32],
    ) -> TransferResult<Self> {
        let mut clients: HashMap<u32, Arc<dyn ChainClient>> = HashMap::new();

        for &chain_id in chain_ids {
            if clients.contains_key(&chain_id) {
                continue;
            }
            let chain = registry.get(chain_id)?;
            info!(
                "Connecting {} client for {} (chain {})",
                chain.family, chain.name, chain.chain_id
            );

            let client: Arc<dyn ChainClient> = match chain.family {
                ExecutionFamily::Evm => {
                    let key = require_key(&settings.wallet.evm_private_key_env)?;
                    Arc::new(EvmClient::connect(chain.clone(), &key).await?)
                }
                ExecutionFamily::Svm => {
                    let key = require_key(&settings.wallet.svm_private_key_env)?;
                    Arc::new(SvmClient::new(chain.clone(), &key)?)
                }
                ExecutionFamily::Mvm => {
                    let key = require_key(&settings.wallet.mvm_private_key_env)?;
                    Arc::new(MvmClient::new(chain.clone(), &key)?)
                }
            };

            info!("Chain {} signer: {}", chain.name, client.address());
            clients.insert(chain_id, client);
        }

        Ok(Self { clients })
    }

    pub fn get_client(&self, chain_id: u32) -> TransferResult<Arc<dyn ChainClient>> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or(TransferError::ChainNotFound { chain_id })
    }

    #[cfg(test)]
    pub fn with_clients(clients: HashMap<u32, Arc<dyn ChainClient>>) -> Self {
        Self { clients }
    }
}

/// Read key material from the environment
fn require_key(env_name: &str) -> TransferResult<String> {
    std::env::var(env_name)
        .map_err(|_| TransferError::Wallet(format!("{} not set in environment", env_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_parses_config_values() {
        for (raw, family) in [
            ("\"EVM\"", ExecutionFamily::Evm),
            ("\"SVM\"", ExecutionFamily::Svm),
            ("\"MVM\"", ExecutionFamily::Mvm),
        ] {
            let parsed: ExecutionFamily = serde_json::from_str(raw).unwrap();
            assert_eq!(parsed, family);
            assert_eq!(format!("\"{}\"", family), raw);
        }
    }

    #[test]
    fn missing_key_is_a_wallet_error() {
        let err = require_key("CROSSFLOW_TEST_UNSET_KEY_VAR").unwrap_err();
        assert!(matches!(err, TransferError::Wallet(_)));
    }
}
