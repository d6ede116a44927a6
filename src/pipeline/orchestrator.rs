//! Stage orchestrator

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::events::{Stage, StageEvent};
use super::{AnalysisRequest, validate_address};
use crate::analysis::context::{ContextAggregator, TxDigest};
use crate::analysis::graph::{Flow, GraphSnapshot, build_graph};
use crate::analysis::models::NormalizedTx;
use crate::analysis::narrative::{FALLBACK_NARRATIVE, Narrative, extract_structured, render_chat_prompt};
use crate::analysis::normalize::{normalize_batch, order_newest_first};
use crate::analysis::patterns::{PatternReport, ThreatLevel, analyze};
use crate::chain::Collaborators;
use crate::chain::models::{ComplianceScore, TokenMetadata, WalletBalance};
use crate::config::AnalysisConfig;
use crate::trace;
use crate::{Error, Result};

const TOKEN_PREVIEW: usize = 5;
const NFT_PREVIEW: usize = 3;
/// History size used by the chat quick analysis.
pub const QUICK_ANALYSIS_LIMIT: usize = 20;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Terminal success event delivered
    Completed,
    /// Failure event delivered
    Failed,
    /// Consumer went away; nothing more was sent
    Disconnected,
}

enum StageFailure {
    Disconnected,
    Fault { step: u8, error: Error },
}

fn fault(stage: Stage) -> impl FnOnce(Error) -> StageFailure {
    move |error| StageFailure::Fault {
        step: stage.step(),
        error,
    }
}

/// Sends events while holding progress non-decreasing.
struct Emitter<'a> {
    tx: &'a mpsc::Sender<StageEvent>,
    progress: u8,
}

impl<'a> Emitter<'a> {
    fn new(tx: &'a mpsc::Sender<StageEvent>) -> Self {
        Self { tx, progress: 0 }
    }

    async fn emit(&mut self, mut event: StageEvent) -> std::result::Result<(), StageFailure> {
        event.progress = event.progress.clamp(self.progress, 100);
        self.progress = event.progress;
        self.tx
            .send(event)
            .await
            .map_err(|_| StageFailure::Disconnected)
    }
}

/// Metadata gathered for the tokens seen in the history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenAnalysis {
    /// Mints with metadata
    pub tokens_analyzed: usize,
    /// Zero-decimal mints whose asset lookup succeeded
    pub nfts_found: usize,
    /// First few token metadata entries
    pub tokens: Vec<TokenMetadata>,
    /// First few NFT asset entries
    pub nfts: Vec<Value>,
}

/// Wallet facts echoed in the final result.
#[derive(Debug, Clone, Serialize)]
pub struct WalletInfo {
    /// Wallet address
    pub address: String,
    /// Native balance in lamports
    pub balance: u64,
    /// Token holdings count
    pub token_count: usize,
    /// Compliance score or its placeholder
    pub wallet_score: ComplianceScore,
}

/// History overview echoed in the final result.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    /// Transactions fetched
    pub total_transactions: usize,
    /// Newest transactions, capped
    pub recent_transactions: Vec<TxDigest>,
}

/// Supporting data of the final result.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedData {
    /// Wallet facts
    pub wallet_info: WalletInfo,
    /// History overview
    pub transaction_summary: TransactionSummary,
    /// Token metadata overview
    pub token_analysis: TokenAnalysis,
}

/// Payload of the terminal success event.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    /// Narrative, structured when the generator returned JSON
    pub analysis_result: Narrative,
    /// Pattern score and signals
    pub risk_assessment: PatternReport,
    /// Flow graph
    pub transaction_graph: GraphSnapshot,
    /// Supporting data
    pub detailed_data: DetailedData,
}

/// Totals of the center-relative flows.
#[derive(Debug, Clone, Serialize)]
pub struct FlowTotals {
    /// SOL received by the center address
    pub total_inflow: f64,
    /// SOL sent by the center address
    pub total_outflow: f64,
    /// Inbound transfers
    pub inflow_count: usize,
    /// Outbound transfers
    pub outflow_count: usize,
}

/// Response of the transaction-flow query.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionFlowReport {
    /// Center address
    pub address: String,
    /// Full flow graph
    pub graph_data: GraphSnapshot,
    /// Flows into the center address
    pub inflow_transactions: Vec<Flow>,
    /// Flows out of the center address
    pub outflow_transactions: Vec<Flow>,
    /// Directional totals
    pub summary: FlowTotals,
}

/// Pattern score attached to a chat answer.
#[derive(Debug, Clone, Serialize)]
pub struct QuickAnalysis {
    /// Scored wallet
    pub address: String,
    /// Transactions the score is based on
    pub recent_transactions: usize,
    /// Pattern risk score, 0 to 100
    pub risk_score: u8,
    /// Level derived from the score
    pub threat_level: ThreatLevel,
}

/// Response of the chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Generator answer or the fallback text
    pub response: String,
    /// Score of the given address
    pub quick_analysis: Option<QuickAnalysis>,
    /// RFC 3339 response time
    pub timestamp: String,
}

/// Runs the analysis pipeline against a set of collaborators.
pub struct Orchestrator {
    collaborators: Collaborators,
    config: AnalysisConfig,
}

impl Orchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(collaborators: Collaborators, config: AnalysisConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Analysis settings.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Collaborators in use.
    #[must_use]
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Run the pipeline to completion on the current task, sending events to `tx`.
    pub async fn run(&self, request: &AnalysisRequest, tx: &mpsc::Sender<StageEvent>) -> RunOutcome {
        let mut emitter = Emitter::new(tx);
        match self.execute(request, &mut emitter).await {
            Ok(()) => {
                info!(address = %request.address, "Analysis completed");
                RunOutcome::Completed
            }
            Err(StageFailure::Disconnected) => {
                info!(address = %request.address, "Client disconnected, stopping analysis");
                RunOutcome::Disconnected
            }
            Err(StageFailure::Fault { step, error }) => {
                error!(address = %request.address, step, error = %error, "Analysis failed");
                match emitter.emit(StageEvent::failed(step, &error.to_string())).await {
                    Ok(()) => RunOutcome::Failed,
                    Err(_) => RunOutcome::Disconnected,
                }
            }
        }
    }

    /// Spawn a run and return its event stream.
    ///
    /// The run executes under a `trace_id` span. A panic inside the run is
    /// reported as a failure event, so the stream always ends with a terminal
    /// event unless the consumer left first.
    pub fn stream(
        self: Arc<Self>,
        request: AnalysisRequest,
        buffer: usize,
        trace_id: String,
    ) -> ReceiverStream<StageEvent> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let span = info_span!("analysis", trace_id = %trace_id, address = %request.address);

        tokio::spawn(
            async move {
                let worker_tx = tx.clone();
                let worker = tokio::spawn(
                    trace::with_trace_id(trace_id, async move {
                        self.run(&request, &worker_tx).await
                    })
                    .in_current_span(),
                );
                match worker.await {
                    Ok(outcome) => debug!(?outcome, "Analysis task finished"),
                    Err(e) => {
                        error!(error = %e, "Analysis task aborted");
                        let _ = tx
                            .send(StageEvent::failed(0, &format!("internal error: {e}")))
                            .await;
                    }
                }
            }
            .instrument(span),
        );

        ReceiverStream::new(rx)
    }

    async fn pause(&self) {
        if !self.config.stage_delay.is_zero() {
            tokio::time::sleep(self.config.stage_delay).await;
        }
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        emitter: &mut Emitter<'_>,
    ) -> std::result::Result<(), StageFailure> {
        let address = request.address.as_str();

        emitter.emit(StageEvent::started(Stage::History)).await?;
        let transactions = self.fetch_history(address, request.limit).await;
        emitter
            .emit(StageEvent::completed(
                Stage::History,
                json!({"transactions_count": transactions.len()}),
            ))
            .await?;
        self.pause().await;

        emitter.emit(StageEvent::started(Stage::Balance)).await?;
        let balance = self.fetch_balance(address).await;
        emitter
            .emit(StageEvent::completed(
                Stage::Balance,
                json!({
                    "native_balance": balance.native_balance,
                    "token_count": balance.tokens.len(),
                }),
            ))
            .await?;
        self.pause().await;

        emitter.emit(StageEvent::started(Stage::TokenMetadata)).await?;
        let tokens = self.analyze_tokens(&transactions).await;
        emitter
            .emit(StageEvent::completed(
                Stage::TokenMetadata,
                json!({
                    "tokens_analyzed": tokens.tokens_analyzed,
                    "nfts_found": tokens.nfts_found,
                }),
            ))
            .await?;
        self.pause().await;

        emitter.emit(StageEvent::started(Stage::Compliance)).await?;
        let wallet_score = self.score(address).await;
        emitter
            .emit(StageEvent::completed(
                Stage::Compliance,
                json!({"wallet_score": wallet_score}),
            ))
            .await?;
        self.pause().await;

        emitter.emit(StageEvent::started(Stage::Patterns)).await?;
        let report = analyze(&transactions).map_err(fault(Stage::Patterns))?;
        emitter
            .emit(StageEvent::completed(
                Stage::Patterns,
                json!({
                    "risk_score": report.assessment.risk_score,
                    "threat_level": report.assessment.threat_level,
                }),
            ))
            .await?;
        self.pause().await;

        emitter.emit(StageEvent::started(Stage::Graph)).await?;
        let graph = build_graph(address, &transactions).map_err(fault(Stage::Graph))?;
        emitter
            .emit(StageEvent::completed(
                Stage::Graph,
                json!({
                    "total_nodes": graph.summary.total_nodes,
                    "total_edges": graph.summary.total_edges,
                    "total_volume": graph.summary.total_volume,
                }),
            ))
            .await?;
        self.pause().await;

        emitter.emit(StageEvent::started(Stage::Context)).await?;
        let notes = format!(
            "native balance: {} lamports; tokens held: {}; token mints analyzed: {}; NFTs found: {}",
            balance.native_balance,
            balance.tokens.len(),
            tokens.tokens_analyzed,
            tokens.nfts_found
        );
        let bundle = ContextAggregator::new(self.config.context_tx_cap)
            .aggregate(&transactions, &wallet_score, address, Some(notes))
            .with_graph_summary(graph.summary.clone())
            .with_assessment(report.assessment);
        emitter
            .emit(StageEvent::completed(
                Stage::Context,
                json!({"tx_count": bundle.tx_count}),
            ))
            .await?;
        self.pause().await;

        emitter.emit(StageEvent::started(Stage::Narrative)).await?;
        let narrative = match self.collaborators.narrative.generate(&bundle).await {
            Ok(text) => extract_structured(&text),
            Err(e) => {
                warn!(collaborator = "narrative", error = %e, "Narrative generation failed");
                Narrative::fallback()
            }
        };

        let result = AnalysisResult {
            analysis_result: narrative,
            risk_assessment: report,
            detailed_data: DetailedData {
                wallet_info: WalletInfo {
                    address: address.to_string(),
                    balance: balance.native_balance,
                    token_count: balance.tokens.len(),
                    wallet_score,
                },
                transaction_summary: TransactionSummary {
                    total_transactions: transactions.len(),
                    recent_transactions: transactions
                        .iter()
                        .take(self.config.recent_tx_cap)
                        .map(TxDigest::from)
                        .collect(),
                },
                token_analysis: tokens,
            },
            transaction_graph: graph,
        };
        let payload = serde_json::to_value(&result)
            .map_err(|e| fault(Stage::Complete)(Error::from(e)))?;
        emitter.emit(StageEvent::finished(payload)).await
    }

    /// History normalized and ordered newest first; empty on collaborator failure.
    async fn fetch_history(&self, address: &str, limit: usize) -> Vec<NormalizedTx> {
        let records = match self.collaborators.activity.fetch_history(address, limit).await {
            Ok(records) => records,
            Err(e) => {
                warn!(collaborator = "activity", error = %e, "History unavailable, continuing with none");
                Vec::new()
            }
        };
        let mut transactions = normalize_batch(&records);
        order_newest_first(&mut transactions);
        debug!(address = %address, count = transactions.len(), "Normalized history");
        transactions
    }

    async fn fetch_balance(&self, address: &str) -> WalletBalance {
        self.collaborators
            .activity
            .fetch_balance(address)
            .await
            .unwrap_or_else(|e| {
                warn!(collaborator = "activity", error = %e, "Balance unavailable, using zero");
                WalletBalance::default()
            })
    }

    async fn score(&self, address: &str) -> ComplianceScore {
        self.collaborators
            .compliance
            .score(address)
            .await
            .unwrap_or_else(|e| {
                warn!(collaborator = "compliance", error = %e, "Compliance score unavailable");
                ComplianceScore::unavailable(&e)
            })
    }

    /// Look up distinct mints concurrently; results keep first-seen order.
    async fn analyze_tokens(&self, transactions: &[NormalizedTx]) -> TokenAnalysis {
        let mut seen = HashSet::new();
        let mints: Vec<&str> = transactions
            .iter()
            .flat_map(NormalizedTx::token_mints)
            .filter(|mint| seen.insert(*mint))
            .take(self.config.max_metadata_lookups)
            .collect();
        if mints.is_empty() {
            return TokenAnalysis::default();
        }

        let activity = &self.collaborators.activity;
        let lookups = join_all(mints.iter().map(|mint| activity.fetch_token_metadata(mint))).await;
        let metadata: Vec<TokenMetadata> = mints
            .iter()
            .zip(lookups)
            .filter_map(|(mint, result)| match result {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!(collaborator = "activity", mint = %mint, error = %e, "Token metadata lookup failed");
                    None
                }
            })
            .collect();

        let nft_mints: Vec<&str> = metadata
            .iter()
            .filter(|m| m.is_nft())
            .map(|m| m.mint.as_str())
            .collect();
        let assets = join_all(nft_mints.iter().map(|mint| activity.fetch_nft_metadata(mint))).await;
        let nfts: Vec<Value> = nft_mints
            .iter()
            .zip(assets)
            .filter_map(|(mint, result)| match result {
                Ok(asset) => Some(asset),
                Err(e) => {
                    warn!(collaborator = "activity", mint = %mint, error = %e, "NFT metadata lookup failed");
                    None
                }
            })
            .collect();
        let nfts_found = nfts.len();

        TokenAnalysis {
            tokens_analyzed: metadata.len(),
            nfts_found,
            tokens: metadata.into_iter().take(TOKEN_PREVIEW).collect(),
            nfts: nfts.into_iter().take(NFT_PREVIEW).collect(),
        }
    }

    /// History plus flow graph, split by direction. History failure yields an
    /// empty graph.
    pub async fn transaction_flow(&self, request: &AnalysisRequest) -> Result<TransactionFlowReport> {
        let transactions = self.fetch_history(&request.address, request.limit).await;
        let graph = build_graph(&request.address, &transactions)?;

        Ok(TransactionFlowReport {
            address: request.address.clone(),
            inflow_transactions: graph.inflows().cloned().collect(),
            outflow_transactions: graph.outflows().cloned().collect(),
            summary: FlowTotals {
                total_inflow: graph.summary.total_inflow,
                total_outflow: graph.summary.total_outflow,
                inflow_count: graph.summary.inflow_count,
                outflow_count: graph.summary.outflow_count,
            },
            graph_data: graph,
        })
    }

    /// Answer a free-form question, scoring `address` when given.
    pub async fn chat(&self, message: &str, address: Option<&str>) -> Result<ChatResponse> {
        if let Some(address) = address {
            validate_address(address)?;
        }

        let prompt = render_chat_prompt(message, address);
        let response = self
            .collaborators
            .narrative
            .complete(&prompt)
            .await
            .unwrap_or_else(|e| {
                warn!(collaborator = "narrative", error = %e, "Chat completion failed");
                FALLBACK_NARRATIVE.to_string()
            });

        let quick_analysis = match address {
            Some(address) => {
                let transactions = self.fetch_history(address, QUICK_ANALYSIS_LIMIT).await;
                let report = analyze(&transactions)?;
                Some(QuickAnalysis {
                    address: address.to_string(),
                    recent_transactions: transactions.len(),
                    risk_score: report.assessment.risk_score,
                    threat_level: report.assessment.threat_level,
                })
            }
            None => None,
        };

        Ok(ChatResponse {
            response,
            quick_analysis,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}
