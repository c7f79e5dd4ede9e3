//! Event classification: raw backend events to typed session events.

use serde::Deserialize;
use serde_json::Value;
use tern_ai::{RawEvent, ThoughtUpdate, ToolCallStatus, UsageSnapshot};

use crate::events::{ContentUpdate, SessionEvent};

#[derive(Deserialize)]
#[serde(untagged)]
enum ProgressPayload {
    Text(String),
    Thought {
        #[serde(default)]
        subject: Option<String>,
        description: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolBatchPayload {
    List(Vec<ToolCallStatus>),
    Wrapped { tools: Vec<ToolCallStatus> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentPayload {
    Text(String),
    Object { text: String },
}

/// Classify a raw event.
///
/// Never fails: unknown kinds and payloads that do not match the expected
/// shape for their kind come back as [`SessionEvent::Other`] holding the
/// original event.
pub fn classify(raw: RawEvent) -> SessionEvent {
    let kind = raw.kind.to_lowercase();
    let request_id = raw.request_id.clone();

    let classified = match kind.as_str() {
        "start" => Some(SessionEvent::Start { request_id }),
        "finish" | "finished" => Some(SessionEvent::Finish { request_id }),
        "progress" | "thought" => parse_progress(&raw.payload)
            .map(|thought| SessionEvent::Progress { request_id, thought }),
        "tool_batch" | "tool_group" => parse_tool_batch(&raw.payload)
            .map(|tools| SessionEvent::ToolBatch { request_id, tools }),
        "content" => parse_content(&raw.payload)
            .map(|text| SessionEvent::Content(ContentUpdate { request_id, text })),
        "usage" | "token_usage" => parse_usage(&raw.payload)
            .map(|usage| SessionEvent::Usage { request_id, usage }),
        "error" => Some(SessionEvent::Error {
            request_id,
            message: error_text(&raw.payload),
        }),
        _ => None,
    };

    match classified {
        Some(event) => event,
        None => {
            tracing::debug!("Unclassified event kind '{}', forwarding as other", raw.kind);
            SessionEvent::Other(raw)
        }
    }
}

fn parse_progress(payload: &Value) -> Option<ThoughtUpdate> {
    match ProgressPayload::deserialize(payload).ok()? {
        ProgressPayload::Text(description) => Some(ThoughtUpdate::new(description)),
        ProgressPayload::Thought {
            subject,
            description,
        } => Some(ThoughtUpdate {
            subject,
            description,
        }),
    }
}

fn parse_tool_batch(payload: &Value) -> Option<Vec<ToolCallStatus>> {
    // A finished batch is sometimes reported with no payload at all
    if payload.is_null() {
        return Some(Vec::new());
    }
    match ToolBatchPayload::deserialize(payload).ok()? {
        ToolBatchPayload::List(tools) | ToolBatchPayload::Wrapped { tools } => Some(tools),
    }
}

fn parse_content(payload: &Value) -> Option<String> {
    match ContentPayload::deserialize(payload).ok()? {
        ContentPayload::Text(text) | ContentPayload::Object { text } => Some(text),
    }
}

fn parse_usage(payload: &Value) -> Option<UsageSnapshot> {
    if !payload.is_object() {
        return None;
    }
    UsageSnapshot::deserialize(payload)
        .ok()
        .map(UsageSnapshot::normalized)
}

/// Extract displayable text from an error payload.
///
/// Strings are used as-is, objects contribute their `message`, `error` or
/// `detail` field (nested one level for `{"error": {"message": ...}}`), and
/// anything else is rendered as JSON.
pub fn error_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            for key in ["message", "error", "detail"] {
                match map.get(key) {
                    Some(Value::String(s)) => return s.clone(),
                    Some(nested @ Value::Object(_)) => return error_text(nested),
                    _ => {}
                }
            }
            payload.to_string()
        }
        Value::Null => "Unknown error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tern_ai::{ConversationId, RequestId, ToolStatus};

    fn raw(kind: &str, payload: Value) -> RawEvent {
        RawEvent::new(
            ConversationId::new("c1"),
            Some(RequestId::new("r1")),
            kind,
            payload,
        )
    }

    #[test]
    fn test_classify_start_and_finish() {
        assert!(matches!(
            classify(raw("start", Value::Null)),
            SessionEvent::Start { .. }
        ));
        assert!(matches!(
            classify(raw("Finished", Value::Null)),
            SessionEvent::Finish { .. }
        ));
    }

    #[test]
    fn test_classify_progress_string() {
        match classify(raw("thought", json!("Reading files"))) {
            SessionEvent::Progress { thought, .. } => {
                assert_eq!(thought.description, "Reading files");
                assert!(thought.subject.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_progress_object() {
        match classify(raw(
            "progress",
            json!({"subject": "Planning", "description": "Outlining steps"}),
        )) {
            SessionEvent::Progress { thought, .. } => {
                assert_eq!(thought.subject.as_deref(), Some("Planning"));
                assert_eq!(thought.description, "Outlining steps");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_tool_batch_list_and_wrapped() {
        let list = json!([{"id": "t1", "name": "shell", "status": "Executing"}]);
        match classify(raw("tool_group", list)) {
            SessionEvent::ToolBatch { tools, .. } => {
                assert_eq!(tools.len(), 1);
                assert_eq!(tools[0].status, ToolStatus::Executing);
            }
            other => panic!("unexpected {:?}", other),
        }

        let wrapped = json!({"tools": [{"callId": "t2", "status": "Success"}]});
        match classify(raw("tool_batch", wrapped)) {
            SessionEvent::ToolBatch { tools, .. } => {
                assert_eq!(tools[0].id, "t2");
                assert_eq!(tools[0].status, ToolStatus::Done);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_tool_batch_null_is_empty() {
        match classify(raw("tool_batch", Value::Null)) {
            SessionEvent::ToolBatch { tools, .. } => assert!(tools.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_content() {
        match classify(raw("content", json!({"text": "hello"}))) {
            SessionEvent::Content(c) => {
                assert_eq!(c.text, "hello");
                assert_eq!(c.request_id, Some(RequestId::new("r1")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_usage() {
        match classify(raw("token_usage", json!({"prompt_tokens": 3, "completion_tokens": 4}))) {
            SessionEvent::Usage { usage, .. } => assert_eq!(usage.total_tokens, 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_error_payload_shapes() {
        let cases = [
            (json!("boom"), "boom"),
            (json!({"message": "bad key"}), "bad key"),
            (json!({"error": {"message": "quota exceeded"}}), "quota exceeded"),
            (Value::Null, "Unknown error"),
        ];
        for (payload, expected) in cases {
            match classify(raw("error", payload)) {
                SessionEvent::Error { message, .. } => assert_eq!(message, expected),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_classify_error_unknown_object_rendered_as_json() {
        assert_eq!(error_text(&json!({"code": 7})), r#"{"code":7}"#);
    }

    #[test]
    fn test_unknown_kind_is_other_and_unchanged() {
        let ev = raw("agent_status", json!({"x": 1}));
        assert_eq!(classify(ev.clone()), SessionEvent::Other(ev));
    }

    #[test]
    fn test_malformed_payload_degrades_to_other() {
        let ev = raw("tool_batch", json!({"unexpected": true}));
        assert!(matches!(classify(ev), SessionEvent::Other(_)));
        let ev = raw("usage", json!("lots"));
        assert!(matches!(classify(ev), SessionEvent::Other(_)));
        let ev = raw("content", json!(42));
        assert!(matches!(classify(ev), SessionEvent::Other(_)));
    }
}
