//! Per-conversation session state

use tern_ai::{ConversationId, RequestId, ResourceCandidate, ThoughtUpdate};

use crate::{busy::BusyState, quota::FallbackSelector, usage::UsageAccumulator};

/// In-memory controller state for one conversation.
///
/// Replaced wholesale when the controller switches conversations, so nothing
/// here leaks from one conversation into the next.
#[derive(Debug)]
pub struct Session {
    /// Conversation this session is attached to
    pub conversation_id: ConversationId,
    /// Request whose progress events are currently accepted
    pub active_request: Option<RequestId>,
    /// Signals behind the busy flag
    pub busy: BusyState,
    /// Progress indicator as last delivered to the UI
    pub progress: Option<ThoughtUpdate>,
    /// Latest usage snapshot
    pub usage: UsageAccumulator,
    /// Exhausted resources and handled quota failures
    pub fallback: FallbackSelector,
    /// Resource the next request is routed to
    pub active_resource: ResourceCandidate,
    /// Unsent input
    pub draft: String,
}

impl Session {
    pub fn new(conversation_id: ConversationId, resource: ResourceCandidate) -> Self {
        Self {
            conversation_id,
            active_request: None,
            busy: BusyState::default(),
            progress: None,
            usage: UsageAccumulator::default(),
            fallback: FallbackSelector::new(),
            active_resource: resource,
            draft: String::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.busy()
    }

    /// Whether `request_id` names a request that has since been replaced
    pub fn is_superseded(&self, request_id: Option<&RequestId>) -> bool {
        matches!(
            (request_id, self.active_request.as_ref()),
            (Some(id), Some(active)) if id != active
        )
    }

    /// Forget the active request if `request_id` refers to it.
    ///
    /// Untagged terminal events settle whatever is active.
    pub fn settle(&mut self, request_id: Option<&RequestId>) {
        if request_id.is_none() || request_id == self.active_request.as_ref() {
            self.active_request = None;
        }
    }
}
