//! SSE formatting for streaming answers.
//!
//! Event sequence: one `metadata`, any number of `content` fragments, then
//! exactly one terminal `done` (or `error` in its place). A client that
//! disconnects mid-stream drops the stream; the drop guard logs the
//! cancellation under the request's trace id, and dropping the underlying
//! fragment stream closes the outbound LLM body.

use std::convert::Infallible;
use std::time::Instant;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use futures_util::stream::Stream;
use serde_json::json;
use tracing::{debug, info};

use crate::llm::FragmentStream;
use crate::retrieval::StreamMeta;

/// Logs stream cancellation unless the terminal event was emitted.
struct CancellationGuard {
    trace_id: String,
    completed: bool,
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        if !self.completed {
            info!(
                trace_id = %self.trace_id,
                "client disconnected mid-stream, cancelling upstream"
            );
        }
    }
}

fn sse_event(kind: &str, data: serde_json::Value) -> Event {
    Event::default().data(json!({ "type": kind, "data": data }).to_string())
}

/// Wraps a fragment stream into the SSE response.
pub fn sse_response(
    meta: StreamMeta,
    fragments: FragmentStream,
    started: Instant,
    trace_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    enum Phase {
        Metadata,
        Content,
        Finished,
    }

    struct StreamState {
        fragments: FragmentStream,
        guard: CancellationGuard,
        meta: Option<StreamMeta>,
        phase: Phase,
        started: Instant,
    }

    let state = StreamState {
        fragments,
        guard: CancellationGuard {
            trace_id,
            completed: false,
        },
        meta: Some(meta),
        phase: Phase::Metadata,
        started,
    };

    let events = futures_util::stream::unfold(state, |mut state| async move {
        match state.phase {
            Phase::Metadata => {
                let meta = state.meta.take().expect("metadata emitted once");
                state.phase = Phase::Content;
                let event = sse_event(
                    "metadata",
                    serde_json::to_value(&meta).unwrap_or(serde_json::Value::Null),
                );
                Some((Ok(event), state))
            }
            Phase::Content => match state.fragments.next().await {
                Some(Ok(fragment)) => {
                    let event = sse_event("content", serde_json::Value::String(fragment));
                    Some((Ok(event), state))
                }
                Some(Err(e)) => {
                    debug!(error = %e, "stream failed mid-flight");
                    state.phase = Phase::Finished;
                    state.guard.completed = true;
                    let event = sse_event("error", json!({ "message": e.to_string() }));
                    Some((Ok(event), state))
                }
                None => {
                    state.phase = Phase::Finished;
                    state.guard.completed = true;
                    let event = sse_event(
                        "done",
                        json!({ "response_time": state.started.elapsed().as_secs_f64() }),
                    );
                    Some((Ok(event), state))
                }
            },
            Phase::Finished => None,
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
