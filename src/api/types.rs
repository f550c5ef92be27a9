//! Wire types for the cross-chain aggregator API
//!
//! Amount fields are minor-unit integer strings and are carried verbatim;
//! this client never parses, reformats, or rounds them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::ExecutionFamily;

/// Parameters for a quote request
#[derive(Debug, Clone)]
pub struct QuoteParams {
    pub user_address: String,
    pub amount: String,
    pub source_chain_id: u32,
    pub target_chain_id: u32,
    pub source_token_address: String,
    pub target_token_address: String,
    pub recipient_address: String,
    pub swap_mode: Option<String>,
}

impl QuoteParams {
    /// Render as query pairs in the order the aggregator documents them
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("userAddress", self.user_address.clone()),
            ("amount", self.amount.clone()),
            ("sourceChainId", self.source_chain_id.to_string()),
            ("targetChainId", self.target_chain_id.to_string()),
            ("sourceTokenAddress", self.source_token_address.clone()),
            ("targetTokenAddress", self.target_token_address.clone()),
            ("recipientAddress", self.recipient_address.clone()),
        ];
        if let Some(ref mode) = self.swap_mode {
            pairs.push(("swapMode", mode.clone()));
        }
        pairs
    }
}

/// Quote response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    pub status: String,
    pub message: String,
    pub data: Quote,
}

/// A priced execution plan for one transfer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub request_id: String,
    pub quote_id: String,
    pub integrator: String,
    pub chains: ChainPair,
    pub tokens: TokenPair,
    pub amounts: Amounts,
    pub fees: Fees,
    pub transaction: TransactionPlan,
    /// Present only when the status endpoint will require an auth proof
    #[serde(default)]
    pub auth: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainPair {
    pub source: u32,
    pub target: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub source_address: String,
    pub target_address: String,
    pub source_symbol: String,
    pub target_symbol: String,
    pub source_decimals: u8,
    pub target_decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amounts {
    pub amount_in: String,
    pub amount_out: String,
    pub amount_in_formatted: String,
    pub amount_out_formatted: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub gas: Option<String>,
    pub relayer: String,
    pub currency: String,
    pub total_usd: Option<f64>,
}

/// Server-issued challenge to be signed with the source-chain key
#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub message: String,
}

/// Family-tagged transaction payload from the quote.
///
/// The tag decides which chain client executes the plan; the dispatcher
/// matches on it and never inspects payload structure to guess a family.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum TransactionPlan {
    /// EVM call(s): optional approval leg, then the execution leg
    #[serde(rename = "evm")]
    Evm {
        approval: Option<EvmLeg>,
        execution: EvmLeg,
    },
    /// Pre-built Solana versioned transaction, base64
    #[serde(rename = "solana")]
    Solana { execution: SolanaLeg },
    /// Aptos entry-function invocation
    #[serde(rename = "aptos")]
    Aptos { execution: AptosEntryLeg },
    /// Pre-serialized Aptos raw transaction, hex BCS
    #[serde(rename = "aptos-serialized")]
    AptosSerialized { execution: AptosRawLeg },
}

impl TransactionPlan {
    /// Execution family this plan must run on
    pub fn family(&self) -> ExecutionFamily {
        match self {
            TransactionPlan::Evm { .. } => ExecutionFamily::Evm,
            TransactionPlan::Solana { .. } => ExecutionFamily::Svm,
            TransactionPlan::Aptos { .. } | TransactionPlan::AptosSerialized { .. } => {
                ExecutionFamily::Mvm
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmLeg {
    #[serde(default)]
    pub description: Option<String>,
    pub data: EvmCallData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmCallData {
    pub to: String,
    pub data: String,
    pub value: String,
    pub chain_id: u32,
    #[serde(default)]
    pub gas_limit: Option<String>,
    #[serde(default)]
    pub max_fee_per_gas: Option<String>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolanaLeg {
    #[serde(default)]
    pub description: Option<String>,
    pub data: SolanaBlob,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolanaBlob {
    /// Base64-encoded versioned transaction
    pub instruction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AptosEntryLeg {
    #[serde(default)]
    pub description: Option<String>,
    pub data: AptosEntryFunction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AptosEntryFunction {
    /// Fully qualified "address::module::function"
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AptosRawLeg {
    #[serde(default)]
    pub description: Option<String>,
    pub data: AptosRawTransaction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AptosRawTransaction {
    /// Hex-encoded BCS raw transaction bytes
    pub raw_transaction: String,
}

/// Parameters for a status query
#[derive(Debug, Clone)]
pub struct StatusParams {
    pub request_id: String,
    pub tx_hash: String,
    pub user_address: String,
    pub recipient_address: String,
    /// Quote amountOut, verbatim
    pub amount: String,
    pub source_chain_id: u32,
    pub target_chain_id: u32,
    pub target_token_address: String,
    pub auth_signature: Option<String>,
    pub auth_public_key: Option<String>,
}

impl StatusParams {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("requestId", self.request_id.clone()),
            ("txHash", self.tx_hash.clone()),
            ("userAddress", self.user_address.clone()),
            ("recipientAddress", self.recipient_address.clone()),
            ("amount", self.amount.clone()),
            ("sourceChainId", self.source_chain_id.to_string()),
            ("targetChainId", self.target_chain_id.to_string()),
            ("targetTokenAddress", self.target_token_address.clone()),
        ];
        if let Some(ref sig) = self.auth_signature {
            pairs.push(("authSignature", sig.clone()));
        }
        if let Some(ref key) = self.auth_public_key {
            pairs.push(("authPublicKey", key.clone()));
        }
        pairs
    }
}

/// Status response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    pub data: StatusSnapshot,
}

/// One observation of the remote transfer state machine
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub transaction_id: String,
    pub tx_hash: String,
    pub source_chain: String,
    pub target_chain: String,
    pub status: TransferStatus,
    pub steps: Vec<TransferStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStep {
    pub name: String,
    pub status: StepStatus,
    pub description: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "PENDING"),
            StepStatus::InProgress => write!(f, "IN_PROGRESS"),
            StepStatus::Completed => write!(f, "COMPLETED"),
            StepStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Remote transfer status.
///
/// COMPLETED and FAILED are terminal. Every other value the server emits
/// (INITIATED, PROCESSING_*) is non-terminal, may repeat or be skipped
/// across polls, and is kept as an opaque string for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransferStatus {
    Initiated,
    Processing(String),
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

impl From<String> for TransferStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "INITIATED" => TransferStatus::Initiated,
            "COMPLETED" => TransferStatus::Completed,
            "FAILED" => TransferStatus::Failed,
            _ => TransferStatus::Processing(s),
        }
    }
}

impl From<TransferStatus> for String {
    fn from(status: TransferStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Initiated => write!(f, "INITIATED"),
            TransferStatus::Processing(s) => write!(f, "{}", s),
            TransferStatus::Completed => write!(f, "COMPLETED"),
            TransferStatus::Failed => write!(f, "FAILED"),
        }
    }
}
