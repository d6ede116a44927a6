//! HTTP surface: router, SSE framing and the listening server

mod router;
mod listener;

pub use router::{AppState, ChatRequest, LimitQuery, RequestTrace, create_router};
pub use listener::Server;
