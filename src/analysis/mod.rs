//! Core analysis: normalization, flow graph, pattern scoring, narrative context
//!
//! Everything here is synchronous and side-effect free; the pipeline drives
//! it between collaborator calls.

pub mod context;
pub mod graph;
pub mod models;
pub mod narrative;
pub mod normalize;
pub mod patterns;

pub use context::{ContextAggregator, ContextBundle};
pub use graph::{FlowGraphBuilder, GraphSnapshot, build_graph};
pub use models::{NormalizedTx, TransferEvent};
pub use narrative::{FALLBACK_NARRATIVE, Narrative, extract_structured};
pub use patterns::{PatternReport, PatternSummary, RiskAssessment, ThreatLevel, analyze};
