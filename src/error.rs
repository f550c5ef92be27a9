//! Error types for the crossflow transfer client

use thiserror::Error;

use crate::chain::ExecutionFamily;

/// Main error type for a cross-chain transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Chain {chain_id} not found in registry")]
    ChainNotFound { chain_id: u32 },

    #[error("Transaction plan is {found} but source chain is {expected}")]
    Validation {
        expected: ExecutionFamily,
        found: ExecutionFamily,
    },

    #[error("Aggregator API error: {0}")]
    Api(String),

    #[error("Chain RPC error: {0}")]
    Rpc(String),

    #[error("Transaction failed on-chain: {message}")]
    TransactionFailed { message: String },

    #[error("Timeout waiting for {operation}")]
    ConfirmationTimeout { operation: String },

    #[error("Transient status query failure: {0}")]
    TransientQuery(String),

    #[error("Transfer failed: {message}")]
    TransferFailed { message: String },

    #[error("Status polling exhausted after {attempts} attempts, outcome unknown")]
    PollingTimeout { attempts: u32 },

    #[error("Quote did not include an auth challenge message")]
    MissingAuthChallenge,
}

impl TransferError {
    /// Transient errors are absorbed by the polling loop and retried
    /// within the attempt budget. Everything else aborts the transfer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::TransientQuery(_) | TransferError::Rpc(_)
        )
    }
}

/// Result type for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransferError::TransientQuery("reset by peer".into()).is_transient());
        assert!(TransferError::Rpc("503".into()).is_transient());
        assert!(!TransferError::TransferFailed {
            message: "relayer claim failed".into()
        }
        .is_transient());
        assert!(!TransferError::PollingTimeout { attempts: 200 }.is_transient());
        assert!(!TransferError::MissingAuthChallenge.is_transient());
    }
}
