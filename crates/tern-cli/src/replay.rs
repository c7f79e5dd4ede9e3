//! Backend that replays a recorded event transcript

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tern_ai::{BackendEventStream, ConversationId, RawEvent, RequestId, SendRequest};
use tern_session::Backend;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// One line of a transcript file
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptLine {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Pins the event to a request instead of the one being replayed
    #[serde(default)]
    pub request_id: Option<RequestId>,
    /// Pins the event to a conversation instead of the sender's
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    /// Pause before emitting this line
    #[serde(default)]
    pub delay_ms: u64,
}

impl TranscriptLine {
    fn to_event(&self, request: &SendRequest) -> RawEvent {
        RawEvent::new(
            self.conversation_id
                .clone()
                .unwrap_or_else(|| request.conversation_id.clone()),
            Some(
                self.request_id
                    .clone()
                    .unwrap_or_else(|| request.request_id.clone()),
            ),
            self.kind.as_str(),
            self.payload.clone(),
        )
    }
}

/// Split transcript lines into turns, each ending at a finish or error
pub fn parse_turns(content: &str) -> anyhow::Result<VecDeque<Vec<TranscriptLine>>> {
    let mut turns = VecDeque::new();
    let mut current = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: TranscriptLine = serde_json::from_str(line)
            .map_err(|e| anyhow::anyhow!("transcript line {}: {}", index + 1, e))?;
        let terminal = matches!(
            parsed.kind.to_lowercase().as_str(),
            "finish" | "finished" | "error"
        );
        current.push(parsed);
        if terminal {
            turns.push_back(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        turns.push_back(current);
    }
    Ok(turns)
}

/// Plays one recorded turn per `send`
pub struct ReplayBackend {
    turns: Mutex<VecDeque<Vec<TranscriptLine>>>,
    event_tx: broadcast::Sender<RawEvent>,
    cancel: Mutex<CancellationToken>,
}

impl ReplayBackend {
    pub fn new(turns: VecDeque<Vec<TranscriptLine>>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            turns: Mutex::new(turns),
            event_tx,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Load a transcript file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let turns = parse_turns(&content)?;
        tracing::debug!("Loaded {} turns from {}", turns.len(), path.display());
        Ok(Self::new(turns))
    }
}

#[async_trait]
impl Backend for ReplayBackend {
    async fn subscribe(&self, conversation_id: &ConversationId) -> tern_ai::Result<BackendEventStream> {
        tracing::debug!("Replay subscription for conversation {}", conversation_id);
        let mut rx = self.event_tx.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Replay subscriber lagged, {} events dropped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn send(&self, request: SendRequest) -> tern_ai::Result<()> {
        let turn = self
            .turns
            .lock()
            .pop_front()
            .ok_or_else(|| tern_ai::Error::backend("replay", "Transcript exhausted"))?;

        let cancel = self.cancel.lock().clone();
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            for line in turn {
                if line.delay_ms > 0 {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(line.delay_ms)) => {}
                    }
                }
                if cancel.is_cancelled() {
                    return;
                }
                let event = line.to_event(&request);
                let terminal = event.is_terminal();
                let _ = tx.send(event);
                if terminal {
                    tracing::debug!("Replayed turn for request {}", request.request_id);
                }
            }
        });
        Ok(())
    }

    async fn stop(&self, conversation_id: &ConversationId) -> tern_ai::Result<()> {
        tracing::debug!("Stopping replay for conversation {}", conversation_id);
        let mut cancel = self.cancel.lock();
        cancel.cancel();
        *cancel = CancellationToken::new();
        Ok(())
    }
}
