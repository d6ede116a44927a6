//! Record normalizer
//!
//! Upstream transaction records arrive as loosely structured JSON whose shape
//! depends on the source (enhanced-transaction API, raw RPC, signature lists).
//! Normalization is total: every expected field is optional and defaults
//! when absent or malformed.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use super::models::{NATIVE_DECIMALS, NATIVE_TOKEN, NormalizedTx, TransferEvent};

/// First present key among `keys`.
fn field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| record.get(*k).filter(|v| !v.is_null()))
}

fn string_field(record: &Value, keys: &[&str]) -> Option<String> {
    field(record, keys)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn array_field<'a>(record: &'a Value, keys: &[&str]) -> &'a [Value] {
    field(record, keys)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// Parse a timestamp given as epoch seconds (number or numeric string) or
/// ISO-8601 text with or without an offset. Naive text is taken as UTC.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            // Fractional epoch seconds are truncated.
            let secs = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?;
            Utc.timestamp_opt(secs, 0).single()
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return Utc.timestamp_opt(secs, 0).single();
            }
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

/// Parse a non-negative integer amount; negatives and garbage become zero.
fn parse_amount(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map_or(0, round_to_u64)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_to_u64(value: f64) -> u64 {
    if value >= u64::MAX as f64 {
        u64::MAX
    } else {
        value.round() as u64
    }
}

fn parse_decimals(value: Option<&Value>) -> Option<u8> {
    value
        .and_then(Value::as_u64)
        .and_then(|d| u8::try_from(d).ok())
}

fn native_transfer(
    entry: &Value,
    signature: Option<&String>,
    timestamp: Option<DateTime<Utc>>,
) -> TransferEvent {
    TransferEvent {
        from_address: string_field(entry, &["fromUserAccount", "from"]).unwrap_or_default(),
        to_address: string_field(entry, &["toUserAccount", "to"]).unwrap_or_default(),
        amount: parse_amount(entry.get("amount")),
        token: NATIVE_TOKEN.to_string(),
        decimals: Some(NATIVE_DECIMALS),
        signature: signature.cloned(),
        timestamp,
    }
}

/// Token transfers prefer the raw integer amount; a UI amount is scaled by its
/// decimals when those are known and taken as-is otherwise.
fn token_transfer(
    entry: &Value,
    signature: Option<&String>,
    timestamp: Option<DateTime<Utc>>,
) -> TransferEvent {
    let (amount, decimals) = if let Some(raw) = entry.get("rawTokenAmount").filter(|v| v.is_object()) {
        (
            parse_amount(raw.get("tokenAmount")),
            parse_decimals(raw.get("decimals")),
        )
    } else {
        let decimals = parse_decimals(entry.get("decimals"));
        let ui_amount = entry.get("tokenAmount");
        let amount = match (decimals, ui_amount.and_then(Value::as_f64)) {
            (Some(d), Some(ui)) if ui.is_finite() && ui > 0.0 => {
                round_to_u64(ui * 10f64.powi(i32::from(d)))
            }
            _ => parse_amount(ui_amount),
        };
        (amount, decimals)
    };

    TransferEvent {
        from_address: string_field(entry, &["fromUserAccount", "from"]).unwrap_or_default(),
        to_address: string_field(entry, &["toUserAccount", "to"]).unwrap_or_default(),
        amount,
        token: string_field(entry, &["mint"]).unwrap_or_default(),
        decimals,
        signature: signature.cloned(),
        timestamp,
    }
}

/// Account keys may be plain strings or `{"pubkey": ...}` objects.
fn account_key(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => entry
            .get("pubkey")
            .or_else(|| entry.get("account"))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// Normalize one upstream record. Never fails.
#[must_use]
pub fn normalize(record: &Value) -> NormalizedTx {
    let signature = string_field(record, &["signature", "txHash", "id"]);
    let timestamp = field(record, &["timestamp", "blockTime", "block_time"]).and_then(parse_timestamp);

    let mut transfers: Vec<TransferEvent> = array_field(record, &["nativeTransfers", "native_transfers"])
        .iter()
        .map(|entry| native_transfer(entry, signature.as_ref(), timestamp))
        .collect();
    transfers.extend(
        array_field(record, &["tokenTransfers", "token_transfers"])
            .iter()
            .map(|entry| token_transfer(entry, signature.as_ref(), timestamp)),
    );

    let mut seen = HashSet::new();
    let mut involved_addresses = Vec::new();
    let listed = array_field(record, &["accounts", "accountKeys"])
        .iter()
        .chain(array_field(record, &["accountData"]))
        .filter_map(account_key);
    let endpoints = transfers
        .iter()
        .flat_map(|t| [t.from_address.as_str(), t.to_address.as_str()]);
    for address in listed.chain(endpoints) {
        if !address.is_empty() && seen.insert(address.to_string()) {
            involved_addresses.push(address.to_string());
        }
    }

    NormalizedTx {
        signature,
        timestamp,
        kind: string_field(record, &["type"]),
        description: string_field(record, &["description"]),
        fee: field(record, &["fee"]).and_then(Value::as_u64),
        transfers,
        involved_addresses,
        instruction_count: array_field(record, &["instructions"]).len(),
    }
}

/// Normalize a batch, skipping records that are not JSON objects.
#[must_use]
pub fn normalize_batch(records: &[Value]) -> Vec<NormalizedTx> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            if record.is_object() {
                Some(normalize(record))
            } else {
                warn!(index, "Skipping non-object transaction record");
                None
            }
        })
        .collect()
}

/// Stable sort newest first; records without a timestamp go last in input order.
pub fn order_newest_first(transactions: &mut [NormalizedTx]) {
    transactions.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_timestamp_flavor() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        for value in [
            json!("2024-01-01T12:00:00Z"),
            json!("2024-01-01T12:00:00+00:00"),
            json!("2024-01-01T14:00:00+02:00"),
            json!("2024-01-01T12:00:00"),
            json!("2024-01-01T12:00:00.000"),
            json!(1_704_110_400),
            json!("1704110400"),
        ] {
            assert_eq!(parse_timestamp(&value), Some(expected), "{value}");
        }
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
        assert_eq!(parse_timestamp(&json!({"seconds": 1})), None);
    }

    #[test]
    fn normalizes_enhanced_transaction() {
        let record = json!({
            "signature": "sig-1",
            "timestamp": 1_704_110_400,
            "type": "TRANSFER",
            "fee": 5000,
            "nativeTransfers": [
                {"fromUserAccount": "A", "toUserAccount": "B", "amount": 1_500_000_000u64}
            ],
            "tokenTransfers": [
                {"fromUserAccount": "B", "toUserAccount": "C", "mint": "MINT",
                 "tokenAmount": 2.5, "rawTokenAmount": {"tokenAmount": "2500000", "decimals": 6}}
            ],
            "accountData": [{"account": "A"}, {"account": "FEE_PAYER"}]
        });

        let tx = normalize(&record);
        assert_eq!(tx.signature.as_deref(), Some("sig-1"));
        assert_eq!(tx.kind.as_deref(), Some("TRANSFER"));
        assert_eq!(tx.fee, Some(5000));
        assert_eq!(tx.transfers.len(), 2);

        let native = &tx.transfers[0];
        assert!(native.is_native());
        assert_eq!(native.amount, 1_500_000_000);
        assert_eq!(native.signature.as_deref(), Some("sig-1"));

        let token = &tx.transfers[1];
        assert_eq!(token.token, "MINT");
        assert_eq!(token.amount, 2_500_000);
        assert_eq!(token.decimals, Some(6));

        assert_eq!(tx.involved_addresses, vec!["A", "FEE_PAYER", "B", "C"]);
        assert_eq!(tx.token_mints().collect::<Vec<_>>(), vec!["MINT"]);
    }

    #[test]
    fn tolerates_missing_and_malformed_fields() {
        let tx = normalize(&json!({
            "txHash": "alt-sig",
            "blockTime": "not a time",
            "nativeTransfers": "oops",
            "accounts": ["X", 7, {"pubkey": "Y"}, "X"]
        }));
        assert_eq!(tx.signature.as_deref(), Some("alt-sig"));
        assert_eq!(tx.timestamp, None);
        assert!(tx.transfers.is_empty());
        assert_eq!(tx.involved_addresses, vec!["X", "Y"]);

        let empty = normalize(&json!({}));
        assert_eq!(empty, NormalizedTx::default());
    }

    #[test]
    fn token_amount_scaled_by_decimals_when_raw_missing() {
        let tx = normalize(&json!({
            "signature": "s",
            "tokenTransfers": [
                {"fromUserAccount": "A", "toUserAccount": "B", "mint": "M", "tokenAmount": 1.25, "decimals": 2},
                {"fromUserAccount": "A", "toUserAccount": "B", "mint": "M", "tokenAmount": 3}
            ]
        }));
        assert_eq!(tx.transfers[0].amount, 125);
        assert_eq!(tx.transfers[1].amount, 3);
        assert_eq!(tx.transfers[1].decimals, None);
    }

    #[test]
    fn negative_amounts_become_zero() {
        let tx = normalize(&json!({
            "signature": "s",
            "nativeTransfers": [{"fromUserAccount": "A", "toUserAccount": "B", "amount": -5}]
        }));
        assert_eq!(tx.transfers[0].amount, 0);
    }

    #[test]
    fn batch_skips_non_objects() {
        let batch = normalize_batch(&[json!({"signature": "a"}), json!("junk"), json!(null)]);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn orders_newest_first_with_undated_last() {
        let mut txs = normalize_batch(&[
            json!({"signature": "old", "timestamp": 100}),
            json!({"signature": "undated"}),
            json!({"signature": "new", "timestamp": 300}),
            json!({"signature": "mid", "timestamp": 200}),
        ]);
        order_newest_first(&mut txs);
        let order: Vec<_> = txs.iter().filter_map(|t| t.signature.as_deref()).collect();
        assert_eq!(order, vec!["new", "mid", "old", "undated"]);
    }
}
