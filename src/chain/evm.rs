//! EVM chain client: account/balance transactions via ethers
//!
//! Executes the quote's call legs (optional approval, then execution),
//! awaiting the receipt of each before moving on. Auth challenges are
//! signed with a recoverable EIP-191 personal-sign signature, so no
//! public key travels with the proof.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tracing::{info, warn};

use super::{AuthProof, ChainClient, ExecutionFamily};
use crate::api::types::{EvmCallData, EvmLeg, TransactionPlan};
use crate::config::ChainConfig;
use crate::error::{TransferError, TransferResult};

/// Delay after a confirmed approval before the execution leg, giving the
/// allowance time to propagate across RPC nodes.
const APPROVAL_PROPAGATION_DELAY: Duration = Duration::from_secs(3);

pub struct EvmClient {
    chain: ChainConfig,
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
}

impl EvmClient {
    /// Connect to the chain's RPC and bind the local wallet to the
    /// network's actual chain ID (EIP-155).
    pub async fn connect(chain: ChainConfig, private_key: &str) -> TransferResult<Self> {
        let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())
            .map_err(|e| TransferError::Config(format!("Invalid RPC URL: {}", e)))?
            .interval(Duration::from_millis(500));

        let network_id = provider
            .get_chainid()
            .await
            .map_err(|e| TransferError::Rpc(format!("Failed to query chain ID: {}", e)))?;

        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| TransferError::Wallet(format!("Invalid EVM private key: {}", e)))?
            .with_chain_id(network_id.as_u64());

        Ok(Self {
            chain,
            client: SignerMiddleware::new(provider, wallet),
        })
    }
}

/// Sends one call leg and waits for its receipt. Seam between the plan's
/// leg ordering and the concrete signer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
trait LegSender {
    async fn send_leg(&self, leg: &EvmLeg) -> TransferResult<String>;
}

#[async_trait]
impl LegSender for EvmClient {
    async fn send_leg(&self, leg: &EvmLeg) -> TransferResult<String> {
        let tx = build_leg_tx(&self.chain, &leg.data)?;

        info!(
            "Sending tx on {} (gas: {})",
            self.chain.name,
            leg.data.gas_limit.as_deref().unwrap_or("default")
        );

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| TransferError::TransactionFailed {
                message: format!("Send failed: {}", e),
            })?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        info!("Transaction sent: {}", tx_hash);

        let receipt = pending
            .await
            .map_err(|e| TransferError::Rpc(format!("Receipt wait failed: {}", e)))?
            .ok_or_else(|| TransferError::TransactionFailed {
                message: format!("Transaction {} dropped before inclusion", tx_hash),
            })?;

        if receipt.status != Some(1.into()) {
            return Err(TransferError::TransactionFailed {
                message: format!(
                    "Transaction {} reverted in block {}",
                    tx_hash,
                    receipt
                        .block_number
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "<pending>".into())
                ),
            });
        }

        info!(
            "Confirmed in block {} (used {} gas)",
            receipt.block_number.unwrap_or_default(),
            receipt.gas_used.unwrap_or_default()
        );

        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn family(&self) -> ExecutionFamily {
        ExecutionFamily::Evm
    }

    fn address(&self) -> String {
        format!("{:?}", self.client.address())
    }

    async fn sign_message(&self, message: &str) -> TransferResult<AuthProof> {
        let signature = self
            .client
            .signer()
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| TransferError::Wallet(format!("Message signing failed: {}", e)))?;

        Ok(AuthProof {
            signature: format!("0x{}", signature),
            public_key: None,
        })
    }

    async fn send_and_confirm(&self, plan: &TransactionPlan) -> TransferResult<String> {
        let (approval, execution) = match plan {
            TransactionPlan::Evm {
                approval,
                execution,
            } => (approval, execution),
            other => {
                return Err(TransferError::Validation {
                    expected: ExecutionFamily::Evm,
                    found: other.family(),
                })
            }
        };

        run_plan(self, approval.as_ref(), execution).await
    }
}

/// Run the plan's legs in order. The approval must be confirmed before
/// the execution leg is sent; a failed approval aborts the transfer with
/// the execution leg never submitted.
async fn run_plan<S: LegSender + Sync>(
    sender: &S,
    approval: Option<&EvmLeg>,
    execution: &EvmLeg,
) -> TransferResult<String> {
    if let Some(approval) = approval {
        info!("Sending token approval...");
        sender.send_leg(approval).await?;
        info!("Approval confirmed");
        tokio::time::sleep(APPROVAL_PROPAGATION_DELAY).await;
    } else {
        info!("No approval needed");
    }

    sender.send_leg(execution).await
}

/// Build a typed transaction from a quote call leg. EIP-1559 fields on the
/// leg win; otherwise a legacy transaction with the chain's configured
/// default gas price (if any).
fn build_leg_tx(chain: &ChainConfig, data: &EvmCallData) -> TransferResult<TypedTransaction> {
    let to: Address = data
        .to
        .parse()
        .map_err(|e| TransferError::Api(format!("Malformed plan 'to' address: {}", e)))?;
    let calldata: Bytes = data
        .data
        .parse()
        .map_err(|e| TransferError::Api(format!("Malformed plan calldata: {}", e)))?;
    let value = parse_amount(&data.value, "value")?;

    let gas_limit = data
        .gas_limit
        .as_deref()
        .map(|g| parse_amount(g, "gasLimit"))
        .transpose()?;

    let typed = if data.max_fee_per_gas.is_some() || data.max_priority_fee_per_gas.is_some() {
        let mut tx = Eip1559TransactionRequest::new()
            .to(to)
            .data(calldata)
            .value(value);
        if let Some(gas) = gas_limit {
            tx = tx.gas(gas);
        }
        if let Some(ref fee) = data.max_fee_per_gas {
            tx = tx.max_fee_per_gas(parse_amount(fee, "maxFeePerGas")?);
        }
        if let Some(ref fee) = data.max_priority_fee_per_gas {
            tx = tx.max_priority_fee_per_gas(parse_amount(fee, "maxPriorityFeePerGas")?);
        }
        TypedTransaction::Eip1559(tx)
    } else {
        let mut tx = TransactionRequest::new().to(to).data(calldata).value(value);
        if let Some(gas) = gas_limit {
            tx = tx.gas(gas);
        }
        match chain.gas_price.as_deref() {
            Some(price) => tx = tx.gas_price(parse_amount(price, "gas_price")?),
            None => warn!("No default gas price for {}, letting the node pick", chain.name),
        }
        TypedTransaction::Legacy(tx)
    };

    Ok(typed)
}

fn parse_amount(raw: &str, field: &str) -> TransferResult<U256> {
    U256::from_dec_str(raw)
        .map_err(|e| TransferError::Api(format!("Malformed plan '{}' field: {}", field, e)))
}
