//! In-process collaborator fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use sentrysol::chain::models::{ComplianceScore, TokenMetadata, WalletBalance};
use sentrysol::chain::{ActivitySource, Collaborators, ComplianceSource, NarrativeGenerator};
use sentrysol::{Error, Result};

/// A 44-character Solana address.
pub const WALLET: &str = "86xCnPeV69n6t3DnyGvkKobf9FdN2H9oiVDdaMpo2MMY";
pub const COUNTERPART: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

/// Scriptable activity source.
#[derive(Default)]
pub struct FakeActivity {
    pub history: Option<Vec<Value>>,
    pub balance: Option<WalletBalance>,
    /// Mint -> decimals. Mints not listed fail.
    pub mints: HashMap<String, u8>,
    /// Per-mint lookup delay, to shuffle completion order.
    pub delays: HashMap<String, Duration>,
    pub failing_nfts: HashSet<String>,
    pub history_calls: AtomicUsize,
}

#[async_trait]
impl ActivitySource for FakeActivity {
    async fn fetch_history(&self, _address: &str, limit: usize) -> Result<Vec<Value>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        match &self.history {
            Some(records) => Ok(records.iter().take(limit).cloned().collect()),
            None => Err(Error::collaborator("helius", "history down")),
        }
    }

    async fn fetch_balance(&self, _address: &str) -> Result<WalletBalance> {
        self.balance
            .clone()
            .ok_or_else(|| Error::collaborator("helius", "balances down"))
    }

    async fn fetch_token_metadata(&self, mint: &str) -> Result<TokenMetadata> {
        if let Some(delay) = self.delays.get(mint) {
            tokio::time::sleep(*delay).await;
        }
        match self.mints.get(mint) {
            Some(decimals) => Ok(TokenMetadata {
                mint: mint.to_string(),
                decimals: Some(*decimals),
                raw: json!({"mint": mint}),
            }),
            None => Err(Error::collaborator("helius", format!("no mint {mint}"))),
        }
    }

    async fn fetch_nft_metadata(&self, mint: &str) -> Result<Value> {
        if self.failing_nfts.contains(mint) {
            Err(Error::collaborator("helius", "getAsset failed"))
        } else {
            Ok(json!({"id": mint, "content": {"metadata": {"name": "Art"}}}))
        }
    }
}

/// Compliance source returning a fixed score or failing.
pub struct FakeCompliance(pub Option<u8>);

#[async_trait]
impl ComplianceSource for FakeCompliance {
    async fn score(&self, _address: &str) -> Result<ComplianceScore> {
        match self.0 {
            Some(risk_score) => Ok(ComplianceScore {
                risk_score,
                raw: json!({"data": {"risk_score": risk_score}}),
                error: None,
            }),
            None => Err(Error::collaborator("blocksec", "status 503")),
        }
    }
}

/// Narrative generator with a canned reply.
pub enum FakeNarrative {
    Reply(String),
    Fail,
    Panic,
}

#[async_trait]
impl NarrativeGenerator for FakeNarrative {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        match self {
            Self::Reply(text) => Ok(text.clone()),
            Self::Fail => Err(Error::collaborator("mistral", "quota exceeded")),
            Self::Panic => panic!("generator exploded"),
        }
    }
}

pub fn collaborators(
    activity: FakeActivity,
    compliance: FakeCompliance,
    narrative: FakeNarrative,
) -> (Collaborators, Arc<FakeActivity>) {
    let activity = Arc::new(activity);
    let collaborators = Collaborators {
        activity: activity.clone(),
        compliance: Arc::new(compliance),
        narrative: Arc::new(narrative),
    };
    (collaborators, activity)
}

/// Enhanced-transaction record moving `amount` lamports.
pub fn transfer_record(signature: &str, timestamp: i64, from: &str, to: &str, amount: u64) -> Value {
    json!({
        "signature": signature,
        "timestamp": timestamp,
        "type": "TRANSFER",
        "nativeTransfers": [
            {"fromUserAccount": from, "toUserAccount": to, "amount": amount}
        ],
        "accountData": [{"account": from}, {"account": to}]
    })
}

/// A small, healthy history around [`WALLET`].
pub fn sample_history() -> Vec<Value> {
    vec![
        transfer_record("sig-3", 1_700_000_300, WALLET, COUNTERPART, 2_000_000_000),
        transfer_record("sig-2", 1_700_000_200, COUNTERPART, WALLET, 500_000_000),
        transfer_record("sig-1", 1_700_000_100, WALLET, COUNTERPART, 250_000_000),
    ]
}

pub fn healthy_activity() -> FakeActivity {
    FakeActivity {
        history: Some(sample_history()),
        balance: Some(WalletBalance {
            native_balance: 3_000_000_000,
            tokens: vec![json!({"mint": "USDC"})],
        }),
        ..FakeActivity::default()
    }
}
