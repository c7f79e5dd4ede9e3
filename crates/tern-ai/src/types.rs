//! Core types shared between the client and agent backends

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque conversation identifier, stable for the conversation's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation token distinguishing one send from a later one in the same conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random request id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a serving target (usually a model id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Known backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Anthropic,
    OpenAI,
    Custom,
}

impl Provider {
    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Anthropic => "Anthropic",
            Provider::OpenAI => "OpenAI",
            Provider::Custom => "Custom",
        }
    }

    /// Parse a provider name as written in config files and flags
    pub fn parse(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" | "codex" => Ok(Provider::OpenAI),
            "custom" => Ok(Provider::Custom),
            other => Err(crate::Error::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Capability tier of a resource, used only to rank fallback candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Lite,
    Standard,
    Pro,
}

impl Tier {
    /// Ranking score; higher-capability tiers score higher
    pub fn score(&self) -> u8 {
        match self {
            Tier::Lite => 0,
            Tier::Standard => 1,
            Tier::Pro => 2,
        }
    }

    /// Infer a tier from a resource identifier.
    ///
    /// Lightweight markers win over capability markers, so
    /// `gemini-2.5-flash-lite` is `Lite` and `o4-mini-pro` is `Lite` too.
    pub fn infer(id: &str) -> Self {
        let id = id.to_lowercase();
        let has = |needle: &str| {
            id.split(|c: char| !c.is_ascii_alphanumeric())
                .any(|part| part == needle)
        };
        if ["lite", "mini", "nano", "haiku"].iter().any(|m| has(m)) {
            Tier::Lite
        } else if ["pro", "opus", "ultra", "max"].iter().any(|m| has(m)) {
            Tier::Pro
        } else {
            Tier::Standard
        }
    }
}

/// A serving target that requests can be routed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceCandidate {
    pub id: ResourceId,
    pub tier: Tier,
}

impl ResourceCandidate {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: ResourceId::new(id),
            tier,
        }
    }

    /// Create a candidate whose tier is inferred from its identifier
    pub fn inferred(id: impl Into<String>) -> Self {
        let id = id.into();
        let tier = Tier::infer(&id);
        Self {
            id: ResourceId::new(id),
            tier,
        }
    }
}

/// Latest resource-usage report for a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    #[serde(default, alias = "prompt_tokens", alias = "input")]
    pub input_tokens: u64,
    #[serde(default, alias = "completion_tokens", alias = "candidates_tokens", alias = "output")]
    pub output_tokens: u64,
    #[serde(default, alias = "total", alias = "total_token_count")]
    pub total_tokens: u64,
}

impl UsageSnapshot {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Fill in `total_tokens` when the backend only reported the breakdown
    pub fn normalized(mut self) -> Self {
        if self.total_tokens == 0 {
            self.total_tokens = self.input_tokens.saturating_add(self.output_tokens);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.total_tokens == 0
    }
}

/// Status of a single tool invocation within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolStatus {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "executing", alias = "running")]
    Executing,
    #[serde(alias = "confirming", alias = "awaiting_approval")]
    Confirming,
    #[serde(
        alias = "done",
        alias = "success",
        alias = "Success",
        alias = "error",
        alias = "Error",
        alias = "canceled",
        alias = "Canceled",
        alias = "cancelled"
    )]
    Done,
}

impl ToolStatus {
    /// Whether the tool still holds the agent busy
    pub fn is_active(&self) -> bool {
        !matches!(self, ToolStatus::Done)
    }
}

/// One tracked tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallStatus {
    #[serde(default, alias = "call_id", alias = "callId")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: ToolStatus,
}

impl ToolCallStatus {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ToolStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
        }
    }
}

/// Ephemeral progress ("thought") signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub description: String,
}

impl ThoughtUpdate {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            subject: None,
            description: description.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// File or blob attached to an outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Path or URI the backend can resolve
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Outgoing request to a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub conversation_id: ConversationId,
    pub request_id: RequestId,
    /// Resource the backend should serve this request with
    pub resource: ResourceId,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}
