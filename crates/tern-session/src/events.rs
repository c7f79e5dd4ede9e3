//! Classified backend events and the updates the controller publishes

use serde::{Deserialize, Serialize};
use tern_ai::{RawEvent, RequestId, ResourceId, ThoughtUpdate, ToolCallStatus, UsageSnapshot};

/// A backend event after classification
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Model output stream opened
    Start { request_id: Option<RequestId> },

    /// Ephemeral progress ("thought") signal
    Progress {
        request_id: Option<RequestId>,
        thought: ThoughtUpdate,
    },

    /// Current status of every tracked tool invocation
    ToolBatch {
        request_id: Option<RequestId>,
        tools: Vec<ToolCallStatus>,
    },

    /// Renderable content
    Content(ContentUpdate),

    /// Resource-usage report, possibly several per turn
    Usage {
        request_id: Option<RequestId>,
        usage: UsageSnapshot,
    },

    /// Model output stream closed
    Finish { request_id: Option<RequestId> },

    /// Backend reported a failure
    Error {
        request_id: Option<RequestId>,
        message: String,
    },

    /// Anything the classifier does not understand, forwarded unchanged
    Other(RawEvent),
}

impl SessionEvent {
    /// Request id the event is tagged with, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            SessionEvent::Start { request_id }
            | SessionEvent::Progress { request_id, .. }
            | SessionEvent::ToolBatch { request_id, .. }
            | SessionEvent::Usage { request_id, .. }
            | SessionEvent::Finish { request_id }
            | SessionEvent::Error { request_id, .. } => request_id.as_ref(),
            SessionEvent::Content(content) => content.request_id.as_ref(),
            SessionEvent::Other(raw) => raw.request_id.as_ref(),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Start { .. } => "start",
            SessionEvent::Progress { .. } => "progress",
            SessionEvent::ToolBatch { .. } => "tool_batch",
            SessionEvent::Content(_) => "content",
            SessionEvent::Usage { .. } => "usage",
            SessionEvent::Finish { .. } => "finish",
            SessionEvent::Error { .. } => "error",
            SessionEvent::Other(_) => "other",
        }
    }
}

/// Content chunk for the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUpdate {
    pub request_id: Option<RequestId>,
    pub text: String,
}

/// State changes published to the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerUpdate {
    /// Derived busy flag changed
    Busy(bool),

    /// Progress indicator changed (None clears it)
    Progress(Option<ThoughtUpdate>),

    /// Content to render
    Content(ContentUpdate),

    /// Usage snapshot replaced
    Usage(UsageSnapshot),

    /// Active resource replaced after a quota failure
    ResourceSwitched { from: ResourceId, to: ResourceId },

    /// Quota failure with no remaining candidate
    NoFallbackAvailable { resource: ResourceId },

    /// Backend failure surfaced verbatim
    Error { message: String },

    /// Unclassified event for the rendering layer
    Passthrough(RawEvent),
}
