//! Completion-channel protocol.
//!
//! Workers report back over a JSON line channel. The receiving end decodes
//! each payload into the closed [`Message`] set before anything else looks
//! at it; schema mismatches surface as [`ProtocolError::MalformedMessage`]
//! instead of leaking duck-typed maps into the engine.
//!
//! The sender half is a cheap cloneable handle — whoever launches a worker
//! gets a `CompletionSender`, while exactly one component (the batch
//! manager) owns the `CompletionReceiver`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::op::{BatchId, OperationId, OperationKind};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed completion message {raw:?}: {source}")]
    MalformedMessage {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A worker's report that its operation finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub time_taken_ms: f64,
    pub return_value: f64,
}

/// Everything that may arrive on a completion channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "operation-report")]
    OperationReport(OperationReport),
}

/// Events the batch manager emits to its parent (in-process, typed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEvent {
    BatchFinished { batch_id: BatchId },
}

/// Sending half of a completion channel. Clone freely; workers hold one.
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<String>,
}

impl CompletionSender {
    /// Encode and send an operation report. Returns false if the receiving
    /// end is gone (the run is shutting down; workers just drop the report).
    pub fn send_report(&self, report: &OperationReport) -> bool {
        let encoded = serde_json::to_string(&Message::OperationReport(report.clone()))
            .expect("operation report serialization cannot fail");
        self.tx.send(encoded).is_ok()
    }

    /// Send a raw payload without encoding. The receiver still decodes it,
    /// so anything that is not a valid `Message` becomes a
    /// `MalformedMessage` on the other side.
    pub fn send_raw(&self, payload: String) -> bool {
        self.tx.send(payload).is_ok()
    }
}

/// Receiving half of a completion channel; decodes at the boundary.
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl CompletionReceiver {
    /// Await the next message. `None` means every sender handle dropped.
    pub async fn recv(&mut self) -> Option<Result<Message, ProtocolError>> {
        let raw = self.rx.recv().await?;
        Some(decode(&raw))
    }

    /// Drain without waiting; used by tests and shutdown paths.
    pub fn try_recv(&mut self) -> Option<Result<Message, ProtocolError>> {
        let raw = self.rx.try_recv().ok()?;
        Some(decode(&raw))
    }
}

fn decode(raw: &str) -> Result<Message, ProtocolError> {
    serde_json::from_str(raw).map_err(|source| ProtocolError::MalformedMessage {
        raw: raw.to_string(),
        source,
    })
}

/// Create a fresh completion channel pair.
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionSender { tx }, CompletionReceiver { rx })
}
