//! Usage persistence as one JSONL file per conversation

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tern_ai::{ConversationId, UsageSnapshot};
use tern_session::{Error, Result, UsageStore};

/// Entry types for the usage JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageEntry {
    /// Usage snapshot reported by the backend
    Usage {
        #[serde(flatten)]
        usage: UsageSnapshot,
        timestamp: i64,
    },
}

/// Appends usage snapshots under a data directory
pub struct JsonlUsageStore {
    dir: PathBuf,
}

impl JsonlUsageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File for a conversation. Bytes outside `[A-Za-z0-9_-]` are
    /// percent-encoded, so distinct ids never share a file and none can
    /// leave the directory.
    fn path_for(&self, conversation_id: &ConversationId) -> PathBuf {
        let mut name = String::with_capacity(conversation_id.as_str().len());
        for byte in conversation_id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.jsonl", name))
    }
}

fn persistence(e: impl std::fmt::Display) -> Error {
    Error::Persistence(e.to_string())
}

impl UsageStore for JsonlUsageStore {
    fn save(&self, conversation_id: &ConversationId, usage: &UsageSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(persistence)?;

        let entry = UsageEntry::Usage {
            usage: *usage,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let line = serde_json::to_string(&entry).map_err(persistence)?;

        let mut file = File::options()
            .create(true)
            .append(true)
            .open(self.path_for(conversation_id))
            .map_err(persistence)?;
        writeln!(file, "{}", line).map_err(persistence)?;
        Ok(())
    }

    fn load(&self, conversation_id: &ConversationId) -> Result<Option<UsageSnapshot>> {
        let path = self.path_for(conversation_id);
        if !path.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(File::open(&path).map_err(persistence)?);
        let mut last = None;
        for line in reader.lines() {
            let line = line.map_err(persistence)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageEntry>(&line) {
                Ok(UsageEntry::Usage { usage, .. }) => last = Some(usage.normalized()),
                Err(e) => tracing::debug!("Skipping malformed usage line in {}: {}", path.display(), e),
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlUsageStore::new(dir.path());
        assert!(store.load(&ConversationId::new("c1")).unwrap().is_none());
    }

    #[test]
    fn test_load_returns_last_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlUsageStore::new(dir.path().join("usage"));
        let conv = ConversationId::new("c1");

        store.save(&conv, &UsageSnapshot::new(10, 2)).unwrap();
        store.save(&conv, &UsageSnapshot::new(40, 8)).unwrap();

        let usage = store.load(&conv).unwrap().unwrap();
        assert_eq!(usage.input_tokens, 40);
        assert_eq!(usage.total_tokens, 48);
    }

    #[test]
    fn test_conversations_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlUsageStore::new(dir.path());
        store
            .save(&ConversationId::new("c1"), &UsageSnapshot::new(1, 1))
            .unwrap();
        assert!(store.load(&ConversationId::new("c2")).unwrap().is_none());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlUsageStore::new(dir.path());
        let conv = ConversationId::new("c1");
        store.save(&conv, &UsageSnapshot::new(5, 5)).unwrap();
        let mut file = File::options()
            .append(true)
            .open(dir.path().join("c1.jsonl"))
            .unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(store.load(&conv).unwrap().unwrap().total_tokens, 10);
    }

    #[test]
    fn test_entry_format() {
        let entry = UsageEntry::Usage {
            usage: UsageSnapshot::new(3, 4),
            timestamp: 1,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "usage");
        assert_eq!(json["input_tokens"], 3);
        assert_eq!(json["total_tokens"], 7);
        assert_eq!(json["timestamp"], 1);
    }

    #[test]
    fn test_path_escapes_separators() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlUsageStore::new(dir.path());
        let path = store.path_for(&ConversationId::new("../etc/passwd"));
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "%2E%2E%2Fetc%2Fpasswd.jsonl"
        );
    }

    #[test]
    fn test_similar_ids_do_not_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlUsageStore::new(dir.path());
        store
            .save(&ConversationId::new("team/alpha"), &UsageSnapshot::new(900, 100))
            .unwrap();

        assert!(store.load(&ConversationId::new("team_alpha")).unwrap().is_none());
        assert!(store.load(&ConversationId::new("team%2Falpha")).unwrap().is_none());
        assert_eq!(
            store
                .load(&ConversationId::new("team/alpha"))
                .unwrap()
                .unwrap()
                .total_tokens,
            1000
        );
    }
}
