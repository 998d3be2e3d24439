//! Progress stream bridge
//!
//! Decouples one coordinator run from an incrementally consumable event
//! stream. The run is spawned as a single unit of work that pushes
//! human-readable progress notes into an mpsc channel; the consumer side is
//! the receiver stream. Channel FIFO guarantees every note is delivered in
//! order and strictly before the terminal event. If the consumer goes away
//! the channel closes and further notes are dropped on the floor; the run
//! itself finishes regardless.

use crate::coordinator::Coordinator;
use crate::models::{FinalResponse, Status};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// One protocol event on the stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental progress note while the pipeline runs.
    Thinking(String),
    /// Terminal: the full successful response.
    Result(FinalResponse),
    /// Terminal: the run failed or produced nothing usable.
    Error(Value),
}

impl StreamEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Thinking(_) => "thinking",
            StreamEvent::Result(_) => "result",
            StreamEvent::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            StreamEvent::Thinking(note) => json!({ "message": note }),
            StreamEvent::Result(response) => {
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
            StreamEvent::Error(payload) => payload.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Thinking(_))
    }
}

/// Producer-side handle the coordinator uses to publish progress notes.
/// A discard sink (for the plain request/response path) drops every note.
#[derive(Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl ProgressSink {
    fn attached(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink for callers that do not stream. Notes are dropped.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Publish a progress note. Send failures mean the consumer is gone;
    /// the run continues without streaming.
    pub fn note(&self, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(StreamEvent::Thinking(text.into()));
        }
    }
}

/// Spawn one coordinator run and return the consumable event stream.
///
/// Dropping the returned stream closes the channel; the in-flight run is not
/// cancelled, but every subsequent send fails cheaply.
pub fn stream_query(
    coordinator: Arc<Coordinator>,
    query: String,
) -> UnboundedReceiverStream<StreamEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = ProgressSink::attached(tx.clone());

    tokio::spawn(async move {
        let response = coordinator.run(&query, &sink).await;
        debug!(status = %response.status, "Coordinator run finished; emitting terminal event");
        let _ = tx.send(terminal_event(response));
    });

    UnboundedReceiverStream::new(rx)
}

/// Map a finished response onto its terminal event. A failed run, or one
/// that carries neither a message nor a result, becomes an error event.
fn terminal_event(response: FinalResponse) -> StreamEvent {
    let unusable = response.message.trim().is_empty() && response.data.result.is_null();

    if response.status == Status::Error || unusable {
        StreamEvent::Error(json!({
            "message": if response.message.trim().is_empty() {
                crate::coordinator::FALLBACK_MESSAGE.to_string()
            } else {
                response.message.clone()
            },
            "logs": response.logs,
        }))
    } else {
        StreamEvent::Result(response)
    }
}
