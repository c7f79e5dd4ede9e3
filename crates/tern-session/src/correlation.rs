//! Correlation of incoming events with the request that produced them.

use tern_ai::{ConversationId, RawEvent, RequestId};

use crate::events::SessionEvent;

/// Whether a raw event belongs to the conversation the session is attached to.
pub fn belongs_to(raw: &RawEvent, conversation_id: &ConversationId) -> bool {
    &raw.conversation_id == conversation_id
}

/// Decide whether a classified event should reach the session state.
///
/// Only `Start` and `Progress` are dropped, and only when they carry a request
/// id other than the active one. Content, tool batches, usage, finish and
/// error always pass: a backend may still be draining tool work started
/// before the request was superseded, and that output must render.
pub fn admit(event: &SessionEvent, active_request: Option<&RequestId>) -> bool {
    match event {
        SessionEvent::Start { .. } | SessionEvent::Progress { .. } => {
            match event.request_id() {
                Some(id) => active_request == Some(id),
                None => true,
            }
        }
        _ => true,
    }
}
