//! Challenge signing for status authentication
//!
//! The aggregator decides whether a transfer needs an auth proof by
//! including `auth.message` in the quote. Presence of that field is the
//! only gate: no inference from route shape or chain pairing.

use tracing::info;

use crate::api::types::AuthChallenge;
use crate::chain::{AuthProof, ChainManager};
use crate::error::{TransferError, TransferResult};

pub struct AuthSigner<'a> {
    manager: &'a ChainManager,
}

impl<'a> AuthSigner<'a> {
    pub fn new(manager: &'a ChainManager) -> Self {
        Self { manager }
    }

    /// Sign the challenge with the source chain's key, in its family's
    /// native scheme.
    pub async fn sign(
        &self,
        source_chain_id: u32,
        challenge: Option<&AuthChallenge>,
    ) -> TransferResult<AuthProof> {
        let challenge = challenge.ok_or(TransferError::MissingAuthChallenge)?;
        let client = self.manager.get_client(source_chain_id)?;

        info!("Signing auth message with the {} key", client.family());
        let proof = client.sign_message(&challenge.message).await?;
        info!("Auth signature generated");
        Ok(proof)
    }
}
