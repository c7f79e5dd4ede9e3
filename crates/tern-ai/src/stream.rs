//! Raw backend event stream

use crate::types::{ConversationId, RequestId};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// An event as emitted by a backend, before classification.
///
/// The `kind` and `payload` are kept loose on purpose: backends differ in the
/// shapes they send, and unrecognized events must reach the rendering layer
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEvent {
    pub fn new(
        conversation_id: ConversationId,
        request_id: Option<RequestId>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            conversation_id,
            request_id,
            kind: kind.into(),
            payload,
        }
    }

    /// Check if this event ends a turn on the backend side
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind.to_lowercase().as_str(),
            "finish" | "finished" | "error"
        )
    }
}

/// A stream of raw backend events for one conversation
pub type BackendEventStream = Pin<Box<dyn Stream<Item = RawEvent> + Send>>;
