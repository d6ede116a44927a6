//! Narrative prompts and post-processing

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::context::ContextBundle;
use crate::Result;

/// Shown when the narrative generator fails.
pub const FALLBACK_NARRATIVE: &str = "AI analysis unavailable. Manual review recommended.";

const ANALYST_PROMPT: &str = r#"You are a blockchain threat intelligence analyst specializing in detecting malicious wallet activities.

Analyze the following combined JSON data gathered for a Solana wallet:

{context}

TASKS:
1. Identify all potential threats (e.g., phishing, scam, dusting, spoofing, approval exploits, rug pulls, laundering patterns).
2. For each threat:
   - threat_type
   - reason (detailed and specific)
   - confidence (Low, Medium, High)
   - supporting_evidence
   - recommended_actions
3. Provide overall_risk_level ( **minimal, low, medium, high, critical** ), risk_score ( **scale 100** ), risk_factors, ioc, and additional_notes.

Respond in valid JSON only.

FORMAT:
{
  "threat_analysis": {
    "metadata": {
      "target_address": "...",
      "chain": "Solana",
      "analysis_timestamp": "{timestamp}",
      "data_sources": ["SentrySol Security AI", "SentrySol Blockchain Analyzer", "SentrySol ML Model"]
    },
    "potential_threats": [...],
    "overall_risk_level": "...",
    "risk_score": ...,
    "risk_factors": [...],
    "ioc": {
      "addresses": [...],
      "transaction_signatures": [...],
      "suspicious_mints": [...],
      "related_programs": [...]
    },
    "additional_notes": "..."
  }
}
"#;

/// Generator output after best-effort JSON extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Narrative {
    /// Parsed JSON document
    Structured(Value),
    /// Opaque text
    Text(String),
}

impl Narrative {
    /// The fixed fallback text.
    #[must_use]
    pub fn fallback() -> Self {
        Self::Text(FALLBACK_NARRATIVE.to_string())
    }
}

/// Pull a JSON document out of generator text.
///
/// Only text that starts with `{` or carries a ```` ```json ```` fence is
/// attempted. The first fenced block is preferred; anything that fails to
/// parse is kept verbatim.
#[must_use]
pub fn extract_structured(text: &str) -> Narrative {
    if !(text.trim_start().starts_with('{') || text.contains("```json")) {
        return Narrative::Text(text.to_string());
    }

    let candidate = fenced_block(text, "```json\n")
        .or_else(|| fenced_block(text, "```\n"))
        .unwrap_or(text);

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Narrative::Structured(value),
        Err(e) => {
            debug!(error = %e, "Narrative is not valid JSON, keeping text");
            Narrative::Text(text.to_string())
        }
    }
}

fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let (_, rest) = text.split_once(opener)?;
    Some(rest.split_once("\n```").map_or(rest, |(body, _)| body))
}

/// Threat-analyst prompt over a context bundle.
pub fn render_prompt(bundle: &ContextBundle, timestamp: &str) -> Result<String> {
    let context = bundle.to_json()?;
    // Timestamp first so a literal "{timestamp}" inside the context survives.
    Ok(ANALYST_PROMPT
        .replace("{timestamp}", timestamp)
        .replace("{context}", &context))
}

/// Conversational prompt for a free-form question.
#[must_use]
pub fn render_chat_prompt(message: &str, address: Option<&str>) -> String {
    format!(
        r#"User message: "{message}"
Wallet address (if provided): {address}

The user is asking about Solana wallet analysis. Provide a helpful response about:
1. What analysis can be performed
2. Security insights about the address (if provided)
3. Suggestions for further investigation

Keep the response conversational and helpful."#,
        address = address.unwrap_or("Not provided"),
    )
}
