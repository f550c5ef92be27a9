//! MVM chain client: Aptos module invocations over the node REST API
//!
//! Two submission paths, matching what quotes deliver:
//! - a structured entry-function invocation, built and signed through the
//!   node's `encode_submission` endpoint,
//! - a pre-serialized BCS raw transaction, signed locally over the salted
//!   signing message and submitted as BCS.
//!
//! Auth challenges get a detached ed25519 signature; the verifier cannot
//! recover an Aptos address from a signature, so the proof carries the
//! public key explicitly.

use async_trait::async_trait;
use chrono::Utc;
use ed25519_dalek::{Signer as _, SigningKey};
use serde::Deserialize;
use serde_json::json;
use sha3::{Digest, Sha3_256};
use std::time::Duration;
use tracing::info;

use super::{AuthProof, ChainClient, ExecutionFamily};
use crate::api::types::{AptosEntryFunction, TransactionPlan};
use crate::config::ChainConfig;
use crate::error::{TransferError, TransferResult};
use crate::poll::{poll_until_terminal, PollState, PollTarget, RetryPolicy};

const MAX_GAS_AMOUNT: &str = "4000";
const GAS_UNIT_PRICE: &str = "100";
const EXPIRATION_WINDOW_SECS: i64 = 600;

/// Domain-separation salt prepended (hashed) to raw transaction bytes
/// before ed25519 signing.
const RAW_TRANSACTION_SALT: &[u8] = b"APTOS::RawTransaction";

pub struct MvmClient {
    chain: ChainConfig,
    http: reqwest::Client,
    signing_key: SigningKey,
}

impl MvmClient {
    pub fn new(chain: ChainConfig, private_key: &str) -> TransferResult<Self> {
        let signing_key = parse_private_key(private_key)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransferError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            chain,
            http,
            signing_key,
        })
    }

    fn public_key_hex(&self) -> String {
        format!(
            "0x{}",
            hex::encode(self.signing_key.verifying_key().to_bytes())
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.chain.rpc_url.trim_end_matches('/'), path)
    }

    /// Build, sign, and submit a structured entry-function invocation.
    ///
    /// The unsigned transaction goes to `encode_submission`, which returns
    /// the exact byte string to sign; the signed request then goes to
    /// `/transactions`.
    async fn submit_entry_function(&self, payload: &AptosEntryFunction) -> TransferResult<String> {
        let sender = self.address();
        let account: AccountInfo = self
            .get_json(&self.url(&format!("/accounts/{}", sender)))
            .await?;

        let expiration = Utc::now().timestamp() + EXPIRATION_WINDOW_SECS;
        let mut request = json!({
            "sender": sender,
            "sequence_number": account.sequence_number,
            "max_gas_amount": MAX_GAS_AMOUNT,
            "gas_unit_price": GAS_UNIT_PRICE,
            "expiration_timestamp_secs": expiration.to_string(),
            "payload": {
                "type": "entry_function_payload",
                "function": payload.function,
                "type_arguments": payload.type_arguments,
                "arguments": payload.arguments,
            },
        });

        let response = self
            .http
            .post(self.url("/transactions/encode_submission"))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransferError::Rpc(format!("encode_submission failed: {}", e)))?;
        let signing_message: String = Self::read_json(response, "encode_submission").await?;

        let message_bytes = decode_hex(&signing_message)
            .map_err(|e| TransferError::Rpc(format!("Bad signing message: {}", e)))?;
        let signature = self.signing_key.sign(&message_bytes);

        request["signature"] = json!({
            "type": "ed25519_signature",
            "public_key": self.public_key_hex(),
            "signature": format!("0x{}", hex::encode(signature.to_bytes())),
        });

        info!("Signing and submitting transaction...");
        let response = self
            .http
            .post(self.url("/transactions"))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransferError::Rpc(format!("Submission failed: {}", e)))?;
        let submitted: SubmitResponse = Self::read_json(response, "submit").await?;

        Ok(submitted.hash)
    }

    /// Sign a pre-serialized raw transaction and submit it as BCS
    async fn submit_raw(&self, raw_hex: &str) -> TransferResult<String> {
        let raw = decode_hex(raw_hex)
            .map_err(|e| TransferError::Api(format!("Plan raw transaction is not hex: {}", e)))?;

        let signature = self.signing_key.sign(&raw_signing_message(&raw));
        let signed = signed_transaction_bcs(
            &raw,
            &self.signing_key.verifying_key().to_bytes(),
            &signature.to_bytes(),
        );

        info!("Submitting serialized transaction...");
        let response = self
            .http
            .post(self.url("/transactions"))
            .header("content-type", "application/x.aptos.signed_transaction+bcs")
            .body(signed)
            .send()
            .await
            .map_err(|e| TransferError::Rpc(format!("Submission failed: {}", e)))?;
        let submitted: SubmitResponse = Self::read_json(response, "submit").await?;

        Ok(submitted.hash)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> TransferResult<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| TransferError::Rpc(format!("GET {} failed: {}", url, e)))?;
        Self::read_json(response, url).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> TransferResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransferError::Rpc(format!("{} response unreadable: {}", what, e)))?;

        if !status.is_success() {
            // the node rejects bad transactions with a structured 4xx body
            return Err(TransferError::TransactionFailed {
                message: format!("{} returned {}: {}", what, status, body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| TransferError::Rpc(format!("{} response malformed: {}", what, e)))
    }

    /// Wait until the transaction leaves the mempool, requiring an
    /// explicit on-chain success.
    async fn await_confirmation(&self, hash: &str) -> TransferResult<()> {
        let policy = RetryPolicy::confirmation();
        let mut wait = TransactionWait {
            client: self,
            hash: hash.to_string(),
        };

        poll_until_terminal(&policy, &mut wait)
            .await
            .map_err(|e| match e {
                TransferError::PollingTimeout { .. } => TransferError::ConfirmationTimeout {
                    operation: format!("Aptos confirmation of {}", hash),
                },
                other => other,
            })
    }
}

#[async_trait]
impl ChainClient for MvmClient {
    fn family(&self) -> ExecutionFamily {
        ExecutionFamily::Mvm
    }

    /// Account address derived from the ed25519 public key with the
    /// single-key scheme suffix.
    fn address(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.signing_key.verifying_key().to_bytes());
        hasher.update([0u8]);
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    async fn sign_message(&self, message: &str) -> TransferResult<AuthProof> {
        let signature = self.signing_key.sign(message.as_bytes());
        Ok(AuthProof {
            signature: format!("0x{}", hex::encode(signature.to_bytes())),
            public_key: Some(self.public_key_hex()),
        })
    }

    async fn send_and_confirm(&self, plan: &TransactionPlan) -> TransferResult<String> {
        info!("Sending transaction on {}...", self.chain.name);

        let hash = match plan {
            TransactionPlan::Aptos { execution } => {
                self.submit_entry_function(&execution.data).await?
            }
            TransactionPlan::AptosSerialized { execution } => {
                self.submit_raw(&execution.data.raw_transaction).await?
            }
            other => {
                return Err(TransferError::Validation {
                    expected: ExecutionFamily::Mvm,
                    found: other.family(),
                })
            }
        };

        info!("Transaction sent: {}", hash);
        info!("Waiting for confirmation...");
        self.await_confirmation(&hash).await?;
        info!("Transaction confirmed");

        Ok(hash)
    }
}

fn parse_private_key(private_key: &str) -> TransferResult<SigningKey> {
    // accept AIP-80 prefixed keys as well as bare hex
    let stripped = private_key
        .trim_start_matches("ed25519-priv-")
        .trim_start_matches("0x");
    let bytes = hex::decode(stripped)
        .map_err(|e| TransferError::Wallet(format!("Invalid Aptos private key: {}", e)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| TransferError::Wallet("Aptos private key must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(raw.trim_start_matches("0x"))
}

/// Signing message for a raw transaction: sha3-256 of the domain salt,
/// followed by the raw BCS bytes.
fn raw_signing_message(raw: &[u8]) -> Vec<u8> {
    let mut message = Sha3_256::digest(RAW_TRANSACTION_SALT).to_vec();
    message.extend_from_slice(raw);
    message
}

/// Assemble a BCS signed transaction: the raw transaction followed by an
/// ed25519 authenticator (variant 0, length-prefixed key and signature).
fn signed_transaction_bcs(raw: &[u8], public_key: &[u8; 32], signature: &[u8; 64]) -> Vec<u8> {
    let mut signed = Vec::with_capacity(raw.len() + 99);
    signed.extend_from_slice(raw);
    signed.push(0); // authenticator variant: ed25519
    signed.push(32);
    signed.extend_from_slice(public_key);
    signed.push(64);
    signed.extend_from_slice(signature);
    signed
}

struct TransactionWait<'a> {
    client: &'a MvmClient,
    hash: String,
}

#[async_trait]
impl PollTarget for TransactionWait<'_> {
    type Output = ();

    async fn check(&mut self) -> TransferResult<PollState<()>> {
        let url = self
            .client
            .url(&format!("/transactions/by_hash/{}", self.hash));
        let response = self
            .client
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TransferError::Rpc(format!("by_hash failed: {}", e)))?;

        // not yet visible to this node
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(PollState::Pending("submitted".into()));
        }

        let info: TransactionView = MvmClient::read_json(response, "by_hash").await?;
        if info.kind == "pending_transaction" {
            return Ok(PollState::Pending("pending".into()));
        }

        match info.success {
            Some(true) => Ok(PollState::Terminal(())),
            _ => Err(TransferError::TransactionFailed {
                message: format!(
                    "Aptos transaction failed: {}",
                    info.vm_status.unwrap_or_else(|| "unknown VM status".into())
                ),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    sequence_number: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TransactionView {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    vm_status: Option<String>,
}
