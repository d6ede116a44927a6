//! Helius address activity client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::ActivitySource;
use super::models::{TokenMetadata, WalletBalance};
use crate::config::{HeliusConfig, resolve_secret};
use crate::failsafe::{RetryPolicy, with_retry};
use crate::trace;
use crate::{Error, Result};

const COLLABORATOR: &str = "helius";

/// Client for the Helius enhanced-transactions API and RPC endpoint.
pub struct HeliusClient {
    client: Client,
    api_key: Option<String>,
    api_url: String,
    rpc_url: String,
    retry: RetryPolicy,
}

impl HeliusClient {
    /// Create a new Helius client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HeliusConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key: resolve_secret(config.api_key.as_deref()),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            rpc_url: config.rpc_url.clone(),
            retry,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::collaborator(COLLABORATOR, "API key not configured"))
    }

    async fn get_json(&self, operation: &str, url: &str, query: &[(&str, String)]) -> Result<Value> {
        with_retry(&self.retry, operation, || async move {
            let response = trace::propagate(self.client.get(url).query(query)).send().await?;
            let response = response.error_for_status()?;
            Ok::<_, Error>(response.json::<Value>().await?)
        })
        .await
        .map_err(|e| e.into_unavailable(COLLABORATOR))
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let key = self.api_key()?;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let payload = &payload;

        let body = with_retry(&self.retry, method, || async move {
            let request = self
                .client
                .post(&self.rpc_url)
                .query(&[("api-key", key)])
                .json(payload);
            let response = trace::propagate(request).send().await?;
            let response = response.error_for_status()?;
            Ok::<_, Error>(response.json::<Value>().await?)
        })
        .await
        .map_err(|e| e.into_unavailable(COLLABORATOR))?;

        rpc_result(method, body)
    }
}

/// Unwrap a JSON-RPC envelope.
fn rpc_result(method: &str, mut body: Value) -> Result<Value> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(Error::collaborator(
            COLLABORATOR,
            format!("{method} failed: {error}"),
        ));
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(Error::collaborator(
            COLLABORATOR,
            format!("{method} response has no result"),
        )),
    }
}

/// Accept either a bare transaction array or an RPC-style `{"result": [...]}`.
fn history_records(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("result") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(Error::collaborator(
                COLLABORATOR,
                "unexpected history response shape",
            )),
        },
        _ => Err(Error::collaborator(
            COLLABORATOR,
            "unexpected history response shape",
        )),
    }
}

/// Read a parsed mint account (`getAccountInfo` with `jsonParsed` encoding).
fn mint_metadata(mint: &str, result: Value) -> Result<TokenMetadata> {
    let account = result.get("value").filter(|v| !v.is_null()).ok_or_else(|| {
        Error::collaborator(COLLABORATOR, format!("mint account {mint} not found"))
    })?;
    let decimals = account
        .pointer("/data/parsed/info/decimals")
        .and_then(Value::as_u64)
        .and_then(|d| u8::try_from(d).ok());

    Ok(TokenMetadata {
        mint: mint.to_string(),
        decimals,
        raw: account.clone(),
    })
}

#[async_trait]
impl ActivitySource for HeliusClient {
    async fn fetch_history(&self, address: &str, limit: usize) -> Result<Vec<Value>> {
        let key = self.api_key()?;
        let url = format!("{}/addresses/{address}/transactions", self.api_url);
        let body = self
            .get_json(
                "helius.history",
                &url,
                &[("api-key", key.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        let records = history_records(body)?;
        debug!(address = %address, count = records.len(), "Fetched address history");
        Ok(records)
    }

    async fn fetch_balance(&self, address: &str) -> Result<WalletBalance> {
        let key = self.api_key()?;
        let url = format!("{}/addresses/{address}/balances", self.api_url);
        let body = self
            .get_json("helius.balances", &url, &[("api-key", key.to_string())])
            .await?;
        Ok(WalletBalance::from_payload(&body))
    }

    async fn fetch_token_metadata(&self, mint: &str) -> Result<TokenMetadata> {
        let result = self
            .rpc("getAccountInfo", json!([mint, {"encoding": "jsonParsed"}]))
            .await?;
        mint_metadata(mint, result)
    }

    async fn fetch_nft_metadata(&self, mint: &str) -> Result<Value> {
        self.rpc("getAsset", json!({"id": mint})).await
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
