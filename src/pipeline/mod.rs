//! Staged wallet analysis
//!
//! A run executes the fixed [`Stage`] list strictly in sequence and reports
//! each step as a [`StageEvent`] on a bounded channel. Collaborator failures
//! degrade to defaults; faults in the core computation end the run with a
//! single failure event.

pub mod events;
pub mod orchestrator;

pub use events::{DONE_MARKER, Stage, StageEvent};
pub use orchestrator::{
    AnalysisResult, ChatResponse, Orchestrator, QuickAnalysis, RunOutcome, TransactionFlowReport,
};

use crate::config::AnalysisConfig;
use crate::{Error, Result};

/// Shortest accepted wallet address.
pub const MIN_ADDRESS_LEN: usize = 32;
/// Longest accepted wallet address.
pub const MAX_ADDRESS_LEN: usize = 44;

/// Reject addresses outside the accepted length range.
pub fn validate_address(address: &str) -> Result<()> {
    let len = address.chars().count();
    if (MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&len) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "wallet address must be {MIN_ADDRESS_LEN} to {MAX_ADDRESS_LEN} characters, got {len}"
        )))
    }
}

/// A validated analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Wallet under analysis
    pub address: String,
    /// History size
    pub limit: usize,
}

impl AnalysisRequest {
    /// Validate `address` and resolve `limit` against the configured bounds.
    pub fn new(address: impl Into<String>, limit: Option<usize>, config: &AnalysisConfig) -> Result<Self> {
        let address = address.into();
        validate_address(&address)?;
        let limit = limit.unwrap_or(config.default_limit);
        if limit == 0 || limit > config.max_limit {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}, got {limit}",
                config.max_limit
            )));
        }
        Ok(Self { address, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "86xCnPeV69n6t3DnyGvkKobf9FdN2H9oiVDdaMpo2MMY";

    #[test]
    fn address_length_bounds() {
        assert!(validate_address(&"a".repeat(31)).is_err());
        assert!(validate_address(&"a".repeat(32)).is_ok());
        assert!(validate_address(&"a".repeat(44)).is_ok());
        assert!(validate_address(&"a".repeat(45)).is_err());
    }

    #[test]
    fn limit_defaults_and_bounds() {
        let config = AnalysisConfig::default();
        let request = AnalysisRequest::new(ADDRESS, None, &config).unwrap();
        assert_eq!(request.limit, config.default_limit);

        assert!(AnalysisRequest::new(ADDRESS, Some(0), &config).is_err());
        assert!(AnalysisRequest::new(ADDRESS, Some(config.max_limit + 1), &config).is_err());
        assert_eq!(
            AnalysisRequest::new(ADDRESS, Some(config.max_limit), &config).unwrap().limit,
            config.max_limit
        );
    }

    #[test]
    fn short_address_is_a_validation_error() {
        let err = AnalysisRequest::new("short", None, &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }
}
