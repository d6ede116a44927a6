//! External collaborators
//!
//! Address activity, compliance scoring and narrative generation are reached
//! through the traits below. The pipeline only ever sees trait objects, so
//! tests substitute in-process fakes.

pub mod blocksec;
pub mod helius;
pub mod mistral;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::analysis::context::ContextBundle;
use crate::analysis::narrative::render_prompt;
use crate::config::Config;
use crate::failsafe::RetryPolicy;
use models::{ComplianceScore, TokenMetadata, WalletBalance};

pub use blocksec::BlockSecClient;
pub use helius::HeliusClient;
pub use mistral::MistralClient;

/// Source of address history, balances and token metadata.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch up to `limit` raw transactions, newest first.
    async fn fetch_history(&self, address: &str, limit: usize) -> Result<Vec<Value>>;
    /// Fetch native balance and token holdings.
    async fn fetch_balance(&self, address: &str) -> Result<WalletBalance>;
    /// Fetch metadata of a token mint.
    async fn fetch_token_metadata(&self, mint: &str) -> Result<TokenMetadata>;
    /// Fetch asset metadata of an NFT mint.
    async fn fetch_nft_metadata(&self, mint: &str) -> Result<Value>;
    /// Whether credentials are present.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Third-party compliance scoring.
#[async_trait]
pub trait ComplianceSource: Send + Sync {
    /// Score an address.
    async fn score(&self, address: &str) -> Result<ComplianceScore>;
    /// Whether credentials are present.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Text generation over an analysis context.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Complete a free-form prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Produce the threat narrative for a context bundle.
    async fn generate(&self, bundle: &ContextBundle) -> Result<String> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let prompt = render_prompt(bundle, &timestamp)?;
        self.complete(&prompt).await
    }

    /// Whether credentials are present.
    fn is_configured(&self) -> bool {
        true
    }
}

/// The set of collaborators one pipeline run talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Address activity source
    pub activity: Arc<dyn ActivitySource>,
    /// Compliance score source
    pub compliance: Arc<dyn ComplianceSource>,
    /// Narrative generator
    pub narrative: Arc<dyn NarrativeGenerator>,
}

impl Collaborators {
    /// Build the HTTP-backed collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryPolicy::new(&config.retry);
        Ok(Self {
            activity: Arc::new(HeliusClient::new(&config.helius, retry.clone())?),
            compliance: Arc::new(BlockSecClient::new(&config.compliance, retry.clone())?),
            narrative: Arc::new(MistralClient::new(&config.narrative, retry)?),
        })
    }
}
