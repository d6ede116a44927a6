//! HTTP router and handlers

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::Error;
use crate::pipeline::{AnalysisRequest, DONE_MARKER, Orchestrator};
use crate::trace::{self, TRACE_HEADER};

/// Shared application state
pub struct AppState {
    /// Pipeline runner
    pub orchestrator: Arc<Orchestrator>,
    /// SSE keep-alive interval
    pub keep_alive_interval: Duration,
    /// Stage events buffered per request
    pub event_buffer: usize,
}

/// Trace id of the request being handled.
#[derive(Debug, Clone)]
pub struct RequestTrace(pub String);

/// Query of the analysis endpoints
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    /// History size
    pub limit: Option<usize>,
}

/// Body of `POST /chat/analyze`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Free-form question
    pub message: String,
    /// Wallet to score alongside the answer
    #[serde(default)]
    pub address: Option<String>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/analyze/{address}", get(analyze_handler))
        .route("/transaction-flow/{address}", get(transaction_flow_handler))
        .route("/chat/analyze", post(chat_handler))
        .layer(middleware::from_fn(trace_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Mint (or adopt) a trace id, scope the request to it and echo it back.
async fn trace_middleware(mut request: Request<Body>, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(trace::generate, String::from);
    request.extensions_mut().insert(RequestTrace(trace_id.clone()));

    let mut response = trace::with_trace_id(trace_id.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}

/// JSON error body for failures raised before any stream is opened.
fn error_response(error: &Error) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "detail": error.to_string() }))).into_response()
}

/// GET / - service banner
async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "SentrySol",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "analyze": "GET /analyze/{address}?limit=N (text/event-stream)",
            "transaction_flow": "GET /transaction-flow/{address}?limit=N",
            "chat": "POST /chat/analyze",
        }
    }))
}

/// GET /health - liveness plus collaborator configuration
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let collaborators = state.orchestrator.collaborators();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "collaborators": {
            "activity": collaborators.activity.is_configured(),
            "compliance": collaborators.compliance.is_configured(),
            "narrative": collaborators.narrative.is_configured(),
        }
    }))
}

/// GET /analyze/{address} - SSE stream of stage events
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Extension(RequestTrace(trace_id)): Extension<RequestTrace>,
    Path(address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let request = match AnalysisRequest::new(address, query.limit, state.orchestrator.config()) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected analysis request");
            return error_response(&e);
        }
    };
    info!(address = %request.address, limit = request.limit, trace_id = %trace_id, "Starting analysis stream");

    let events = Arc::clone(&state.orchestrator).stream(request, state.event_buffer, trace_id);
    Sse::new(sse_events(events))
        .keep_alive(
            KeepAlive::new()
                .interval(state.keep_alive_interval)
                .text("ping"),
        )
        .into_response()
}

/// Frame stage events as SSE `data:` records, closing a successful run with
/// the done marker.
fn sse_events(
    mut events: impl Stream<Item = crate::pipeline::StageEvent> + Unpin + Send + 'static,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> + Send + 'static {
    stream! {
        while let Some(event) = events.next().await {
            let success = event.is_success();
            yield Ok(Event::default().data(event.to_json()));
            if success {
                yield Ok(Event::default().data(DONE_MARKER));
            }
        }
    }
}

/// GET /transaction-flow/{address} - flow graph split by direction
async fn transaction_flow_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let orchestrator = &state.orchestrator;
    let result = match AnalysisRequest::new(address, query.limit, orchestrator.config()) {
        Ok(request) => orchestrator.transaction_flow(&request).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            warn!(error = %e, "Transaction flow failed");
            error_response(&e)
        }
    }
}

/// POST /chat/analyze - free-form question with optional quick analysis
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Response {
    match state
        .orchestrator
        .chat(&body.message, body.address.as_deref())
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!(error = %e, "Chat analysis failed");
            error_response(&e)
        }
    }
}
