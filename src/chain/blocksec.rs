//! BlockSec address compliance client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::ComplianceSource;
use super::models::ComplianceScore;
use crate::config::{ComplianceConfig, resolve_secret};
use crate::failsafe::{RetryPolicy, with_retry};
use crate::trace;
use crate::{Error, Result};

const COLLABORATOR: &str = "blocksec";

/// Chain id for EVM mainnet addresses.
pub const EVM_CHAIN_ID: i64 = 1;
/// Chain id for Solana addresses.
pub const SOLANA_CHAIN_ID: i64 = -3;

/// Detect the chain id from the address encoding.
///
/// `0x`-prefixed 42-character addresses are EVM, 44-character addresses are Solana.
#[must_use]
pub fn detect_chain_id(address: &str) -> Option<i64> {
    if address.starts_with("0x") && address.len() == 42 {
        Some(EVM_CHAIN_ID)
    } else if address.len() == 44 {
        Some(SOLANA_CHAIN_ID)
    } else {
        None
    }
}

/// Client for the BlockSec risk-score API.
pub struct BlockSecClient {
    client: Client,
    api_key: Option<String>,
    url: String,
    retry: RetryPolicy,
}

impl BlockSecClient {
    /// Create a new compliance client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ComplianceConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key: resolve_secret(config.api_key.as_deref()),
            url: config.url.clone(),
            retry,
        })
    }
}

/// Pull the score out of a risk-score response.
fn parse_score(raw: Value) -> Result<ComplianceScore> {
    let score = raw
        .pointer("/data/risk_score")
        .or_else(|| raw.get("risk_score"))
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::collaborator(COLLABORATOR, "response carries no risk_score"))?;

    // Clamped to 0..=100 before the cast.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let risk_score = score.clamp(0.0, 100.0).round() as u8;

    Ok(ComplianceScore {
        risk_score,
        raw,
        error: None,
    })
}

#[async_trait]
impl ComplianceSource for BlockSecClient {
    async fn score(&self, address: &str) -> Result<ComplianceScore> {
        let chain_id = detect_chain_id(address).ok_or_else(|| {
            Error::collaborator(COLLABORATOR, "unsupported wallet address format")
        })?;
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::collaborator(COLLABORATOR, "API key not configured"))?;
        let payload = json!({
            "chain_id": chain_id,
            "address": address,
            "interaction_risk": true,
        });
        let payload = &payload;

        let raw = with_retry(&self.retry, "blocksec.risk_score", || async move {
            let request = self.client.post(&self.url).header("API-KEY", key).json(payload);
            let response = trace::propagate(request).send().await?;
            let response = response.error_for_status()?;
            Ok::<_, Error>(response.json::<Value>().await?)
        })
        .await
        .map_err(|e| e.into_unavailable(COLLABORATOR))?;

        parse_score(raw)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
