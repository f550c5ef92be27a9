//! Single-shot transfer orchestration
//!
//! Strictly sequential: quote, then dispatch, then (if challenged) sign,
//! then poll. Each step consumes its predecessor's result; nothing else
//! mutates the transfer while a wait is outstanding.

use std::time::Duration;
use tracing::info;

use crate::api::types::{Quote, QuoteParams, StatusParams, StatusSnapshot};
use crate::api::ApiClient;
use crate::auth::AuthSigner;
use crate::chain::{AuthProof, ChainManager, ChainRegistry};
use crate::config::Settings;
use crate::error::TransferResult;
use crate::poll::{RetryPolicy, StatusPoller};
use crate::tx::Dispatcher;

/// Everything the status endpoint needs to identify one transfer.
/// Built once from the quote and consumed exactly once by the poll.
/// Amount strings are carried verbatim from the quote.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub request_id: String,
    pub quote_id: String,
    pub source_chain_id: u32,
    pub target_chain_id: u32,
    pub target_token_address: String,
    pub amount_in: String,
    pub amount_out: String,
    pub user_address: String,
    pub recipient_address: String,
}

impl TransferRequest {
    pub fn from_quote(quote: &Quote, user_address: String, recipient_address: String) -> Self {
        Self {
            request_id: quote.request_id.clone(),
            quote_id: quote.quote_id.clone(),
            source_chain_id: quote.chains.source,
            target_chain_id: quote.chains.target,
            target_token_address: quote.tokens.target_address.clone(),
            amount_in: quote.amounts.amount_in.clone(),
            amount_out: quote.amounts.amount_out.clone(),
            user_address,
            recipient_address,
        }
    }
}

/// Status query parameters for a dispatched transfer. The amount is the
/// quote's amountOut, byte-for-byte.
fn status_params(
    request: &TransferRequest,
    tx_hash: String,
    proof: Option<&AuthProof>,
) -> StatusParams {
    StatusParams {
        request_id: request.request_id.clone(),
        tx_hash,
        user_address: request.user_address.clone(),
        recipient_address: request.recipient_address.clone(),
        amount: request.amount_out.clone(),
        source_chain_id: request.source_chain_id,
        target_chain_id: request.target_chain_id,
        target_token_address: request.target_token_address.clone(),
        auth_signature: proof.map(|p| p.signature.clone()),
        auth_public_key: proof.and_then(|p| p.public_key.clone()),
    }
}

/// Orchestrates one cross-chain transfer end to end
pub struct TransferFlow {
    settings: Settings,
    registry: ChainRegistry,
    manager: ChainManager,
    api: ApiClient,
}

impl TransferFlow {
    pub async fn init(settings: Settings) -> TransferResult<Self> {
        let registry = ChainRegistry::from_settings(&settings);
        let manager = ChainManager::connect(
            &settings,
            &registry,
            &[
                settings.transfer.source_chain_id,
                settings.transfer.target_chain_id,
            ],
        )
        .await?;
        let api = ApiClient::new(settings.api.clone())?;

        Ok(Self {
            settings,
            registry,
            manager,
            api,
        })
    }

    pub async fn run(&self) -> TransferResult<StatusSnapshot> {
        let transfer = &self.settings.transfer;
        let source = self.registry.get(transfer.source_chain_id)?;
        let target = self.registry.get(transfer.target_chain_id)?;
        let source_token = self.registry.token(transfer.source_chain_id, &transfer.token)?;
        let target_token = self.registry.token(transfer.target_chain_id, &transfer.token)?;

        let user_address = self.manager.get_client(transfer.source_chain_id)?.address();
        let recipient_address = match &transfer.recipient {
            Some(recipient) => recipient.clone(),
            None => self.manager.get_client(transfer.target_chain_id)?.address(),
        };

        info!(
            "Route: {} ({}) -> {} ({})",
            source.name, source.chain_id, target.name, target.chain_id
        );
        info!("User address: {}", user_address);
        info!("Recipient address: {}", recipient_address);

        // Step 1: quote
        let quote = self
            .api
            .get_quote(&QuoteParams {
                user_address: user_address.clone(),
                amount: transfer.amount.clone(),
                source_chain_id: transfer.source_chain_id,
                target_chain_id: transfer.target_chain_id,
                source_token_address: source_token.address.clone(),
                target_token_address: target_token.address.clone(),
                recipient_address: recipient_address.clone(),
                swap_mode: transfer.swap_mode.clone(),
            })
            .await?;
        let request = TransferRequest::from_quote(&quote, user_address, recipient_address);

        // Step 2: dispatch on the source chain
        let dispatcher = Dispatcher::new(&self.registry, &self.manager);
        let tx_hash = dispatcher
            .dispatch(transfer.source_chain_id, &quote.transaction)
            .await?;
        info!("Source transaction confirmed: {}", tx_hash);

        // Step 3: sign the auth challenge, iff the quote carried one
        let proof = match quote.auth.as_ref() {
            Some(_) => Some(
                AuthSigner::new(&self.manager)
                    .sign(transfer.source_chain_id, quote.auth.as_ref())
                    .await?,
            ),
            None => {
                info!("Quote carried no auth challenge, polling unauthenticated");
                None
            }
        };

        // Step 4: poll until terminal
        let params = status_params(&request, tx_hash, proof.as_ref());
        let policy = RetryPolicy::status(
            self.settings.polling.max_attempts,
            Duration::from_millis(self.settings.polling.transient_delay_ms),
        );
        StatusPoller::new(&self.api, params, policy).run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::QuoteResponse;

    fn quote() -> Quote {
        let json = serde_json::json!({
            "status": "success",
            "message": "ok",
            "data": {
                "requestId": "req-9",
                "quoteId": "q-9",
                "integrator": "relay",
                "chains": { "source": 11, "target": 1 },
                "tokens": {
                    "sourceAddress": "0xsrc",
                    "targetAddress": "Epj",
                    "sourceSymbol": "USDC",
                    "targetSymbol": "USDC",
                    "sourceDecimals": 6,
                    "targetDecimals": 6
                },
                "amounts": {
                    // deliberately odd string; must survive untouched
                    "amountIn": "000100000",
                    "amountOut": "0099500",
                    "amountInFormatted": "0.1",
                    "amountOutFormatted": "0.0995"
                },
                "fees": { "gas": null, "relayer": "0", "currency": "USDC", "totalUsd": null },
                "transaction": {
                    "kind": "solana",
                    "execution": { "data": { "instruction": "AQID" } }
                }
            }
        });
        serde_json::from_value::<QuoteResponse>(json).unwrap().data
    }

    #[test]
    fn amount_out_passes_through_verbatim() {
        let request = TransferRequest::from_quote(&quote(), "user".into(), "rcpt".into());
        let params = status_params(&request, "0xhash".into(), None);
        assert_eq!(params.amount.as_bytes(), b"0099500");
        assert_eq!(request.amount_in, "000100000");
    }

    #[test]
    fn proof_fields_flow_into_status_params() {
        let request = TransferRequest::from_quote(&quote(), "user".into(), "rcpt".into());

        let unauthenticated = status_params(&request, "0xhash".into(), None);
        assert!(unauthenticated.auth_signature.is_none());
        assert!(unauthenticated.auth_public_key.is_none());

        let proof = AuthProof {
            signature: "sig".into(),
            public_key: None,
        };
        let signed = status_params(&request, "0xhash".into(), Some(&proof));
        assert_eq!(signed.auth_signature.as_deref(), Some("sig"));
        assert!(signed.auth_public_key.is_none());
    }
}
