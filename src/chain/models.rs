//! Collaborator data models

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Native balance and token holdings of a wallet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Native balance in minor units (lamports).
    pub native_balance: u64,
    /// Token holdings as reported upstream.
    pub tokens: Vec<Value>,
}

impl WalletBalance {
    /// Read a balances payload, defaulting absent fields.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        let native_balance = payload
            .get("nativeBalance")
            .or_else(|| payload.get("native_balance"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let tokens = payload
            .get("tokens")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            native_balance,
            tokens,
        }
    }
}

/// Metadata of a token mint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Mint address.
    pub mint: String,
    /// Decimal places, when the mint account reports them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    /// Raw mint account payload.
    pub raw: Value,
}

impl TokenMetadata {
    /// Zero-decimal mints are treated as NFTs.
    #[must_use]
    pub fn is_nft(&self) -> bool {
        self.decimals == Some(0)
    }
}

/// Score returned by the compliance service.
///
/// A failed lookup is represented by a zero score with `error` set, so the
/// consumer always receives the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceScore {
    /// Risk score reported by the service, 0 to 100.
    pub risk_score: u8,
    /// Raw service response.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
    /// Why the score is a placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComplianceScore {
    /// Placeholder used when the compliance call failed.
    #[must_use]
    pub fn unavailable(error: &Error) -> Self {
        Self {
            risk_score: 0,
            raw: Value::Null,
            error: Some(error.to_string()),
        }
    }

    /// Whether this is a real score.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }
}
