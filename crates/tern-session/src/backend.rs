//! Backend abstraction: the conversation engine the controller drives

use async_trait::async_trait;
use tern_ai::{BackendEventStream, ConversationId, Result, SendRequest};

/// An agent backend seen as an opaque event source.
///
/// Commands are fire-and-forget: `send` and `stop` return once the backend
/// has accepted the command, and their effects are observed on the stream
/// returned by `subscribe`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open the event stream for a conversation.
    ///
    /// The stream may carry events for other conversations; the controller
    /// filters them out.
    async fn subscribe(&self, conversation_id: &ConversationId) -> Result<BackendEventStream>;

    /// Dispatch a request
    async fn send(&self, request: SendRequest) -> Result<()>;

    /// Ask the backend to cancel whatever it is doing for a conversation
    async fn stop(&self, conversation_id: &ConversationId) -> Result<()>;
}
