//! Per-request trace ids.
//!
//! A trace id is `"ss-<uuid-v4>"`, minted once per HTTP request or CLI run.
//! It is attached to the pipeline span, returned as the `x-trace-id` response
//! header and sent on every outbound collaborator request.
//!
//! The id lives in the [`TRACE_ID`] task-local. [`with_trace_id`] scopes a
//! future to an id; [`current`] reads it from anywhere below that scope.

use uuid::Uuid;

/// Header carrying the trace id in both directions.
pub const TRACE_HEADER: &str = "x-trace-id";

tokio::task_local! {
    /// Trace id of the current task.
    pub static TRACE_ID: String;
}

/// Mint a new trace id.
#[must_use]
pub fn generate() -> String {
    format!("ss-{}", Uuid::new_v4())
}

/// Trace id of the current task, if one is installed.
#[must_use]
pub fn current() -> Option<String> {
    TRACE_ID.try_with(Clone::clone).ok()
}

/// Run `future` with `trace_id` installed.
pub async fn with_trace_id<F, T>(trace_id: String, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    TRACE_ID.scope(trace_id, future).await
}

/// Attach the current trace id to an outbound request.
#[must_use]
pub fn propagate(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match current() {
        Some(id) => request.header(TRACE_HEADER, id),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_embeds_uuid_v4() {
        let id = generate();
        let uuid = Uuid::parse_str(id.strip_prefix("ss-").unwrap()).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
        assert_ne!(generate(), id);
    }

    #[tokio::test]
    async fn current_is_scoped() {
        assert_eq!(current(), None);
        let id = generate();
        let seen = with_trace_id(id.clone(), async { current() }).await;
        assert_eq!(seen, Some(id));
        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn nested_scope_shadows_outer() {
        let (outer, inner) = with_trace_id("ss-outer".to_string(), async {
            let outer = current();
            let inner = with_trace_id("ss-inner".to_string(), async { current() }).await;
            (outer, inner)
        })
        .await;
        assert_eq!(outer.as_deref(), Some("ss-outer"));
        assert_eq!(inner.as_deref(), Some("ss-inner"));
    }

    #[tokio::test]
    async fn propagate_sets_header_inside_scope() {
        let client = reqwest::Client::new();
        let request = with_trace_id("ss-abc".to_string(), async {
            propagate(client.get("http://localhost/")).build().unwrap()
        })
        .await;
        assert_eq!(request.headers()[TRACE_HEADER], "ss-abc");

        let request = propagate(client.get("http://localhost/")).build().unwrap();
        assert!(request.headers().get(TRACE_HEADER).is_none());
    }
}
