//! Transaction dispatch
//!
//! Validates that a quote's plan matches the source chain's execution
//! family, then hands it to that chain's client for confirmed submission.
//! The family check runs before any network I/O: the server may route a
//! quote differently than the caller expected, and that is a normal
//! runtime error, not a programming bug.

use tracing::info;

use crate::api::types::TransactionPlan;
use crate::chain::{ChainManager, ChainRegistry};
use crate::error::{TransferError, TransferResult};

pub struct Dispatcher<'a> {
    registry: &'a ChainRegistry,
    manager: &'a ChainManager,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a ChainRegistry, manager: &'a ChainManager) -> Self {
        Self { registry, manager }
    }

    /// Submit the plan on its source chain and return the confirmed
    /// transaction identifier. Never returns after mere broadcast.
    pub async fn dispatch(
        &self,
        source_chain_id: u32,
        plan: &TransactionPlan,
    ) -> TransferResult<String> {
        let expected = self.registry.family(source_chain_id)?;
        let found = plan.family();
        if found != expected {
            return Err(TransferError::Validation { expected, found });
        }

        let client = self.manager.get_client(source_chain_id)?;
        info!("Dispatching {} plan on chain {}", found, source_chain_id);
        client.send_and_confirm(plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::api::types::{EvmCallData, EvmLeg, SolanaBlob, SolanaLeg};
    use crate::chain::{ChainClient, ExecutionFamily, MockChainClient};
    use crate::config::{ChainConfig, NativeCurrency};

    fn chain(chain_id: u32, family: ExecutionFamily) -> ChainConfig {
        ChainConfig {
            chain_id,
            name: format!("chain-{}", chain_id),
            family,
            rpc_url: "http://localhost".into(),
            native_currency: NativeCurrency {
                name: "n".into(),
                symbol: "N".into(),
                decimals: 18,
            },
            gas_price: None,
            tokens: HashMap::new(),
        }
    }

    fn evm_plan() -> TransactionPlan {
        TransactionPlan::Evm {
            approval: None,
            execution: EvmLeg {
                description: None,
                data: EvmCallData {
                    to: "0xabc".into(),
                    data: "0x".into(),
                    value: "0".into(),
                    chain_id: 11,
                    gas_limit: None,
                    max_fee_per_gas: None,
                    max_priority_fee_per_gas: None,
                },
            },
        }
    }

    fn solana_plan() -> TransactionPlan {
        TransactionPlan::Solana {
            execution: SolanaLeg {
                description: None,
                data: SolanaBlob {
                    instruction: "AQID".into(),
                },
            },
        }
    }

    #[tokio::test]
    async fn mismatched_plan_is_rejected_before_any_send() {
        let registry = ChainRegistry::with_chains(vec![chain(11, ExecutionFamily::Evm)]);

        let mut client = MockChainClient::new();
        client.expect_send_and_confirm().times(0);
        let clients: HashMap<u32, Arc<dyn ChainClient>> =
            HashMap::from([(11u32, Arc::new(client) as Arc<dyn ChainClient>)]);
        let manager = ChainManager::with_clients(clients);

        let err = Dispatcher::new(&registry, &manager)
            .dispatch(11, &solana_plan())
            .await
            .unwrap_err();

        match err {
            TransferError::Validation { expected, found } => {
                assert_eq!(expected, ExecutionFamily::Evm);
                assert_eq!(found, ExecutionFamily::Svm);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn matching_plan_is_sent_exactly_once() {
        let registry = ChainRegistry::with_chains(vec![chain(11, ExecutionFamily::Evm)]);

        let mut client = MockChainClient::new();
        client
            .expect_send_and_confirm()
            .times(1)
            .returning(|_| Ok("0xabc".to_string()));
        let clients: HashMap<u32, Arc<dyn ChainClient>> =
            HashMap::from([(11u32, Arc::new(client) as Arc<dyn ChainClient>)]);
        let manager = ChainManager::with_clients(clients);

        let tx_hash = Dispatcher::new(&registry, &manager)
            .dispatch(11, &evm_plan())
            .await
            .unwrap();
        assert_eq!(tx_hash, "0xabc");
    }

    #[tokio::test]
    async fn unknown_chain_is_rejected() {
        let registry = ChainRegistry::with_chains(vec![chain(11, ExecutionFamily::Evm)]);
        let manager = ChainManager::with_clients(HashMap::new());

        let err = Dispatcher::new(&registry, &manager)
            .dispatch(42, &evm_plan())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChainNotFound { chain_id: 42 }));
    }
}
