//! Stage events and their wire framing

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker line closing a successful stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Stage {
    History,
    Balance,
    TokenMetadata,
    Compliance,
    Patterns,
    Graph,
    Context,
    Narrative,
    Complete,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 9] = [
        Stage::History,
        Stage::Balance,
        Stage::TokenMetadata,
        Stage::Compliance,
        Stage::Patterns,
        Stage::Graph,
        Stage::Context,
        Stage::Narrative,
        Stage::Complete,
    ];

    /// One-based step index.
    #[must_use]
    pub fn step(self) -> u8 {
        match self {
            Self::History => 1,
            Self::Balance => 2,
            Self::TokenMetadata => 3,
            Self::Compliance => 4,
            Self::Patterns => 5,
            Self::Graph => 6,
            Self::Context => 7,
            Self::Narrative => 8,
            Self::Complete => 9,
        }
    }

    /// Progress reported when the stage starts.
    #[must_use]
    pub fn start_progress(self) -> u8 {
        match self {
            Self::History => 10,
            Self::Balance => 20,
            Self::TokenMetadata => 30,
            Self::Compliance => 45,
            Self::Patterns => 60,
            Self::Graph => 70,
            Self::Context => 85,
            Self::Narrative => 95,
            Self::Complete => 100,
        }
    }

    /// Progress reported when the stage finishes.
    #[must_use]
    pub fn done_progress(self) -> u8 {
        match self {
            Self::History => 15,
            Self::Balance => 25,
            Self::TokenMetadata => 40,
            Self::Compliance => 55,
            Self::Patterns => 65,
            Self::Graph => 80,
            Self::Context => 90,
            Self::Narrative => 95,
            Self::Complete => 100,
        }
    }

    fn start_status(self) -> &'static str {
        match self {
            Self::History => "Fetching transaction history...",
            Self::Balance => "Fetching wallet balance...",
            Self::TokenMetadata => "Analyzing token metadata...",
            Self::Compliance => "Checking compliance risk score...",
            Self::Patterns => "Analyzing transaction patterns...",
            Self::Graph => "Building transaction flow graph...",
            Self::Context => "Aggregating analysis context...",
            Self::Narrative => "Running AI security analysis...",
            Self::Complete => "Analysis complete",
        }
    }

    fn done_status(self) -> &'static str {
        match self {
            Self::History => "Transaction history retrieved",
            Self::Balance => "Wallet balance retrieved",
            Self::TokenMetadata => "Token metadata analyzed",
            Self::Compliance => "Compliance risk score retrieved",
            Self::Patterns => "Transaction patterns analyzed",
            Self::Graph => "Transaction flow graph built",
            Self::Context => "Analysis context aggregated",
            Self::Narrative => "AI security analysis finished",
            Self::Complete => "Analysis complete",
        }
    }
}

/// One progress record of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Step index of the stage that emitted this event (0 for supervisor faults)
    pub step: u8,
    /// Human-readable status
    pub status: String,
    /// 0 to 100, non-decreasing within a run
    pub progress: u8,
    /// Stage payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Set on the failure event
    #[serde(default)]
    pub error: bool,
    /// Set on the last event of a run
    #[serde(default)]
    pub terminal: bool,
}

impl StageEvent {
    /// A stage is starting.
    #[must_use]
    pub fn started(stage: Stage) -> Self {
        Self {
            step: stage.step(),
            status: stage.start_status().to_string(),
            progress: stage.start_progress(),
            data: None,
            error: false,
            terminal: false,
        }
    }

    /// A stage finished with `data`.
    #[must_use]
    pub fn completed(stage: Stage, data: Value) -> Self {
        Self {
            step: stage.step(),
            status: stage.done_status().to_string(),
            progress: stage.done_progress(),
            data: Some(data),
            error: false,
            terminal: false,
        }
    }

    /// Terminal success carrying the final result.
    #[must_use]
    pub fn finished(result: Value) -> Self {
        Self {
            terminal: true,
            ..Self::completed(Stage::Complete, result)
        }
    }

    /// Terminal failure raised at `step`.
    #[must_use]
    pub fn failed(step: u8, message: &str) -> Self {
        Self {
            step,
            status: format!("Analysis failed: {message}"),
            progress: 100,
            data: None,
            error: true,
            terminal: true,
        }
    }

    /// Whether this event ends a successful run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.terminal && !self.error
    }

    /// Serialized JSON body.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A struct of plain fields and a `Value` always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `data: {json}` line with its blank-line terminator.
    #[must_use]
    pub fn to_line(&self) -> String {
        format_line(&self.to_json())
    }
}

/// Frame a payload as a prefixed event record.
#[must_use]
pub fn format_line(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_table_is_non_decreasing() {
        let mut last = 0;
        for stage in Stage::ALL {
            assert!(stage.start_progress() >= last, "{stage:?}");
            assert!(stage.done_progress() >= stage.start_progress(), "{stage:?}");
            last = stage.done_progress();
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn steps_follow_execution_order() {
        let steps: Vec<u8> = Stage::ALL.iter().map(|s| s.step()).collect();
        assert_eq!(steps, (1..=9).collect::<Vec<u8>>());
    }

    #[test]
    fn failure_event_is_terminal_at_full_progress() {
        let event = StageEvent::failed(5, "transaction has no signature");
        assert!(event.error && event.terminal);
        assert_eq!(event.progress, 100);
        assert!(!event.is_success());
        assert_eq!(event.status, "Analysis failed: transaction has no signature");
    }

    #[test]
    fn line_framing() {
        let event = StageEvent::completed(Stage::History, json!({"transactions_count": 3}));
        let line = event.to_line();
        assert!(line.starts_with("data: {"));
        assert!(line.ends_with("}\n\n"));
        assert!(line.contains("\"transactions_count\":3"));
        assert_eq!(format_line(DONE_MARKER), "data: [DONE]\n\n");
    }

    #[test]
    fn started_events_carry_no_data() {
        let value: Value = serde_json::from_str(&StageEvent::started(Stage::Graph).to_json()).unwrap();
        assert_eq!(value["step"], 6);
        assert_eq!(value["progress"], 70);
        assert!(value.get("data").is_none());
        assert_eq!(value["error"], false);
    }
}
