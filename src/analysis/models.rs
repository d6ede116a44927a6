//! Canonical transaction shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Symbol of the native asset.
pub const NATIVE_TOKEN: &str = "SOL";
/// Decimal places of the native asset.
pub const NATIVE_DECIMALS: u8 = 9;

/// Convert minor units to display units.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_display_units(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(i32::from(decimals))
}

/// A single value movement between two addresses within one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Sender (empty when upstream omitted it).
    pub from_address: String,
    /// Receiver (empty when upstream omitted it).
    pub to_address: String,
    /// Amount in the token's smallest unit.
    pub amount: u64,
    /// [`NATIVE_TOKEN`] for native transfers, otherwise the token mint.
    pub token: String,
    /// Decimal places of `token`, when known.
    pub decimals: Option<u8>,
    /// Signature of the enclosing transaction.
    pub signature: Option<String>,
    /// Block time of the enclosing transaction.
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransferEvent {
    /// Whether this moves the native asset.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.token == NATIVE_TOKEN
    }

    /// Both endpoints are present.
    #[must_use]
    pub fn has_endpoints(&self) -> bool {
        !self.from_address.is_empty() && !self.to_address.is_empty()
    }

    /// Minor units making up one whole token, when decimals are known.
    #[must_use]
    pub fn one_unit(&self) -> Option<u64> {
        self.decimals.and_then(|d| 10u64.checked_pow(u32::from(d)))
    }

    /// The signature, which every transfer past normalization must carry.
    pub fn require_signature(&self) -> Result<&str> {
        self.signature.as_deref().ok_or_else(|| {
            Error::Aggregation(format!(
                "transfer {} -> {} has no transaction signature",
                self.from_address, self.to_address
            ))
        })
    }
}

/// One upstream transaction in canonical form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTx {
    /// Transaction signature.
    pub signature: Option<String>,
    /// Block time in UTC.
    pub timestamp: Option<DateTime<Utc>>,
    /// Upstream classification (e.g. `TRANSFER`, `SWAP`).
    pub kind: Option<String>,
    /// Upstream human-readable description.
    pub description: Option<String>,
    /// Fee in lamports.
    pub fee: Option<u64>,
    /// Native and token transfers, native first.
    pub transfers: Vec<TransferEvent>,
    /// Every address the transaction references, first-seen order.
    pub involved_addresses: Vec<String>,
    /// Top-level instruction count.
    pub instruction_count: usize,
}

impl NormalizedTx {
    /// The signature, which every transaction past normalization must carry.
    pub fn require_signature(&self) -> Result<&str> {
        self.signature
            .as_deref()
            .ok_or_else(|| Error::Aggregation("transaction has no signature".to_string()))
    }

    /// Mints of the token transfers in this transaction.
    pub fn token_mints(&self) -> impl Iterator<Item = &str> {
        self.transfers
            .iter()
            .filter(|t| !t.is_native() && !t.token.is_empty())
            .map(|t| t.token.as_str())
    }
}
