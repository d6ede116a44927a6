//! Narrative context bundle
//!
//! The bundle is what the narrative generator sees: a capped digest of the
//! history, the compliance score and whatever the earlier stages derived.
//! Raw upstream payloads are never included.

use serde::{Deserialize, Serialize};

use super::graph::GraphSummary;
use super::models::{NormalizedTx, TransferEvent};
use super::patterns::RiskAssessment;
use crate::Result;
use crate::chain::models::ComplianceScore;

/// Essential fields of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDigest {
    /// Sender
    pub from: String,
    /// Receiver
    pub to: String,
    /// Amount in minor units
    pub amount: u64,
    /// Asset symbol or mint
    pub token: String,
}

impl From<&TransferEvent> for TransferDigest {
    fn from(transfer: &TransferEvent) -> Self {
        Self {
            from: transfer.from_address.clone(),
            to: transfer.to_address.clone(),
            amount: transfer.amount,
            token: transfer.token.clone(),
        }
    }
}

/// Essential fields of one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxDigest {
    /// Transaction signature
    pub signature: Option<String>,
    /// Epoch seconds
    pub block_time: Option<i64>,
    /// Upstream classification
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Upstream description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fee in lamports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    /// Top-level instruction count
    pub instruction_count: usize,
    /// Transfers in the transaction
    pub transfers: Vec<TransferDigest>,
    /// Referenced addresses
    pub accounts: Vec<String>,
}

impl From<&NormalizedTx> for TxDigest {
    fn from(tx: &NormalizedTx) -> Self {
        Self {
            signature: tx.signature.clone(),
            block_time: tx.timestamp.map(|t| t.timestamp()),
            kind: tx.kind.clone(),
            description: tx.description.clone(),
            fee: tx.fee,
            instruction_count: tx.instruction_count,
            transfers: tx.transfers.iter().map(TransferDigest::from).collect(),
            accounts: tx.involved_addresses.clone(),
        }
    }
}

/// Input to the narrative generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Wallet under analysis
    pub target_address: String,
    /// Number of transactions before capping
    pub tx_count: usize,
    /// Digests of the first `tx_cap` transactions
    pub txs: Vec<TxDigest>,
    /// Compliance service result or its placeholder
    pub compliance: ComplianceScore,
    /// Flow graph totals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_summary: Option<GraphSummary>,
    /// Pattern score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    /// Free-form notes from earlier stages
    pub notes: Option<String>,
    /// Epoch seconds at aggregation time
    pub fetched_at: i64,
}

impl ContextBundle {
    /// Attach the graph totals.
    #[must_use]
    pub fn with_graph_summary(mut self, summary: GraphSummary) -> Self {
        self.graph_summary = Some(summary);
        self
    }

    /// Attach the pattern assessment.
    #[must_use]
    pub fn with_assessment(mut self, assessment: RiskAssessment) -> Self {
        self.risk_assessment = Some(assessment);
        self
    }

    /// Pretty JSON used in the narrative prompt.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds [`ContextBundle`]s with a fixed transaction cap.
#[derive(Debug, Clone, Copy)]
pub struct ContextAggregator {
    tx_cap: usize,
}

impl ContextAggregator {
    /// Aggregator keeping at most `tx_cap` transaction digests.
    #[must_use]
    pub fn new(tx_cap: usize) -> Self {
        Self { tx_cap }
    }

    /// Package `transactions` and the compliance score.
    #[must_use]
    pub fn aggregate(
        &self,
        transactions: &[NormalizedTx],
        compliance: &ComplianceScore,
        target_address: &str,
        notes: Option<String>,
    ) -> ContextBundle {
        ContextBundle {
            target_address: target_address.to_string(),
            tx_count: transactions.len(),
            txs: transactions
                .iter()
                .take(self.tx_cap)
                .map(TxDigest::from)
                .collect(),
            compliance: compliance.clone(),
            graph_summary: None,
            risk_assessment: None,
            notes,
            fetched_at: chrono::Utc::now().timestamp(),
        }
    }
}
