//! Aggregator API client
//!
//! Two stateless calls against the cross-chain aggregator: fetch a quote
//! and query transfer status. Both go over one shared HTTP client that
//! carries the api key header and a transport-level timeout.

pub mod types;

use types::{Quote, QuoteParams, QuoteResponse, StatusParams, StatusResponse};

use std::time::Duration;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::error::{TransferError, TransferResult};

/// HTTP client for the aggregator's quote and status endpoints
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> TransferResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let key = reqwest::header::HeaderValue::from_str(&config.api_key)
            .map_err(|e| TransferError::Config(format!("Invalid API key: {}", e)))?;
        headers.insert("x-api-key", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TransferError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Fetch a quote. Any failure here is fatal; there is nothing to retry
    /// against a plan we never received.
    pub async fn get_quote(&self, params: &QuoteParams) -> TransferResult<Quote> {
        let url = format!("{}{}", self.config.base_url, self.config.quote_endpoint);
        info!("Fetching quote from {}", url);

        let response = self
            .http
            .get(&url)
            .query(&params.query())
            .send()
            .await
            .map_err(|e| TransferError::Api(format!("Quote request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransferError::Api(format!("Quote response unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(TransferError::Api(format!(
                "Quote request returned {}: {}",
                status, body
            )));
        }

        let envelope: QuoteResponse = serde_json::from_str(&body)
            .map_err(|e| TransferError::Api(format!("Malformed quote response: {}", e)))?;
        let quote = envelope.data;

        info!("Quote received, request ID {}", quote.request_id);
        info!(
            "Amount in: {} {} | amount out: {} {}",
            quote.amounts.amount_in_formatted,
            quote.tokens.source_symbol,
            quote.amounts.amount_out_formatted,
            quote.tokens.target_symbol
        );
        if let Some(usd) = quote.fees.total_usd {
            info!("Total fees: ${}", usd);
        }

        Ok(quote)
    }

    /// Query transfer status once.
    ///
    /// Failures are classified transient: the poller absorbs them and
    /// retries within its attempt budget.
    pub async fn get_status(&self, params: &StatusParams) -> TransferResult<StatusResponse> {
        let url = format!("{}{}", self.config.base_url, self.config.status_endpoint);
        debug!("Querying status for request {}", params.request_id);

        let response = self
            .http
            .get(&url)
            .query(&params.query())
            .send()
            .await
            .map_err(|e| TransferError::TransientQuery(format!("Status request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            TransferError::TransientQuery(format!("Status response unreadable: {}", e))
        })?;

        if !status.is_success() {
            return Err(TransferError::TransientQuery(format!(
                "Status request returned {}: {}",
                status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| TransferError::TransientQuery(format!("Malformed status response: {}", e)))
    }
}
