//! Pattern-based risk scoring

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::models::{NormalizedTx, TransferEvent};
use crate::Result;

/// Two timestamped transactions closer than this are rapid.
pub const RAPID_WINDOW_SECS: i64 = 60;
/// Counterpart count above which fan-out adds to the score.
pub const FAN_OUT_THRESHOLD: usize = 100;

const LARGE_TRANSFER_WEIGHT: usize = 10;
const RAPID_WEIGHT: usize = 5;
const FAN_OUT_WEIGHT: usize = 50;
const MAX_SCORE: usize = 100;

/// Coarse risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    /// Score below 30
    Low,
    /// Score from 30 to 69
    Medium,
    /// Score of 70 and above
    High,
}

impl ThreatLevel {
    /// Band a score.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..30 => Self::Low,
            30..70 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Signals found in a transaction list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    /// Number of transactions scanned
    pub total_transactions: usize,
    /// Distinct addresses referenced across all transactions
    pub unique_counterparts: usize,
    /// Transfers of at least one whole token
    pub large_transfers: Vec<TransferEvent>,
    /// Signatures of transactions within the rapid window of their predecessor
    pub rapid_transactions: Vec<String>,
}

/// Score and band derived from a [`PatternSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0 to 100
    pub risk_score: u8,
    /// Band of `risk_score`
    pub threat_level: ThreatLevel,
}

impl RiskAssessment {
    /// Score a summary.
    #[must_use]
    pub fn from_summary(summary: &PatternSummary) -> Self {
        let fan_out = if summary.unique_counterparts > FAN_OUT_THRESHOLD {
            FAN_OUT_WEIGHT
        } else {
            0
        };
        let raw = summary
            .large_transfers
            .len()
            .saturating_mul(LARGE_TRANSFER_WEIGHT)
            .saturating_add(summary.rapid_transactions.len().saturating_mul(RAPID_WEIGHT))
            .saturating_add(fan_out);
        let risk_score = u8::try_from(raw.min(MAX_SCORE)).unwrap_or(u8::MAX);

        Self {
            risk_score,
            threat_level: ThreatLevel::from_score(risk_score),
        }
    }
}

/// Summary plus assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    /// Score and band
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    /// Underlying signals
    pub patterns: PatternSummary,
}

fn is_large(transfer: &TransferEvent) -> bool {
    transfer
        .one_unit()
        .is_some_and(|unit| transfer.amount >= unit)
}

/// Scan `transactions` for risk signals.
///
/// Transactions are scanned in the order given, which callers keep newest
/// first. Rapid detection compares each timestamped transaction with the
/// previous timestamped one using the absolute gap; untimestamped entries
/// neither trigger nor reset the window.
///
/// # Errors
///
/// Returns [`crate::Error::Aggregation`] when a transaction has no signature.
pub fn analyze(transactions: &[NormalizedTx]) -> Result<PatternReport> {
    let window = TimeDelta::seconds(RAPID_WINDOW_SECS);
    let mut counterparts: HashSet<&str> = HashSet::new();
    let mut summary = PatternSummary {
        total_transactions: transactions.len(),
        ..PatternSummary::default()
    };
    let mut previous: Option<DateTime<Utc>> = None;

    for tx in transactions {
        let signature = tx.require_signature()?;
        counterparts.extend(tx.involved_addresses.iter().map(String::as_str));
        summary
            .large_transfers
            .extend(tx.transfers.iter().filter(|t| is_large(t)).cloned());

        if let Some(current) = tx.timestamp {
            if previous.is_some_and(|prev| (prev - current).abs() < window) {
                summary.rapid_transactions.push(signature.to_string());
            }
            previous = Some(current);
        }
    }
    summary.unique_counterparts = counterparts.len();

    Ok(PatternReport {
        assessment: RiskAssessment::from_summary(&summary),
        patterns: summary,
    })
}
