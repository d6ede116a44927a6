//! Mistral chat-completions narrative generator

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::NarrativeGenerator;
use crate::config::{NarrativeConfig, resolve_secret};
use crate::failsafe::{RetryPolicy, with_retry};
use crate::trace;
use crate::{Error, Result};

const COLLABORATOR: &str = "mistral";

/// Narrative generator backed by a chat-completions endpoint.
pub struct MistralClient {
    client: Client,
    api_key: Option<String>,
    url: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl MistralClient {
    /// Create a new narrative client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &NarrativeConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key: resolve_secret(config.api_key.as_deref()),
            url: config.url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            retry,
        })
    }
}

fn completion_text(body: &Value) -> Result<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::collaborator(COLLABORATOR, "completion has no message content"))
}

#[async_trait]
impl NarrativeGenerator for MistralClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::collaborator(COLLABORATOR, "API key not configured"))?;
        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let payload = &payload;

        let body = with_retry(&self.retry, "mistral.complete", || async move {
            let request = self.client.post(&self.url).bearer_auth(key).json(payload);
            let response = trace::propagate(request).send().await?;
            let response = response.error_for_status()?;
            Ok::<_, Error>(response.json::<Value>().await?)
        })
        .await
        .map_err(|e| e.into_unavailable(COLLABORATOR))?;

        completion_text(&body)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
