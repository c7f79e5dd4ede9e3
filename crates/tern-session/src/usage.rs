//! Usage accounting and the persistence seam it reports to.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tern_ai::{ConversationId, UsageSnapshot};

use crate::error::Result;

/// Durable storage for the latest usage snapshot of each conversation
pub trait UsageStore: Send + Sync {
    /// Persist the latest snapshot for a conversation
    fn save(&self, conversation_id: &ConversationId, usage: &UsageSnapshot) -> Result<()>;

    /// Load the latest persisted snapshot, if any
    fn load(&self, conversation_id: &ConversationId) -> Result<Option<UsageSnapshot>>;
}

/// Type alias for a shared usage store
pub type SharedUsageStore = Arc<dyn UsageStore>;

/// Usage store kept in memory, for tests and embedders without persistence
#[derive(Default)]
pub struct InMemoryUsageStore {
    entries: Mutex<HashMap<ConversationId, UsageSnapshot>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for InMemoryUsageStore {
    fn save(&self, conversation_id: &ConversationId, usage: &UsageSnapshot) -> Result<()> {
        self.entries.lock().insert(conversation_id.clone(), *usage);
        Ok(())
    }

    fn load(&self, conversation_id: &ConversationId) -> Result<Option<UsageSnapshot>> {
        Ok(self.entries.lock().get(conversation_id).copied())
    }
}

/// Holds the most recent usage snapshot of the attached conversation
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    last: Option<UsageSnapshot>,
}

impl UsageAccumulator {
    pub fn last(&self) -> Option<UsageSnapshot> {
        self.last
    }

    /// Record a usage report. Empty snapshots are ignored.
    ///
    /// Persistence is best-effort: a failing store is logged and the
    /// in-memory snapshot is still replaced. Returns whether the snapshot
    /// was taken.
    pub fn record(
        &mut self,
        conversation_id: &ConversationId,
        usage: UsageSnapshot,
        store: &dyn UsageStore,
    ) -> bool {
        if usage.is_empty() {
            return false;
        }
        self.last = Some(usage);
        if let Err(e) = store.save(conversation_id, &usage) {
            tracing::warn!(
                "Failed to persist usage for conversation {}: {}",
                conversation_id,
                e
            );
        }
        true
    }

    /// Restore the persisted snapshot of a conversation being attached.
    pub fn restore(&mut self, conversation_id: &ConversationId, store: &dyn UsageStore) {
        self.last = match store.load(conversation_id) {
            Ok(usage) => usage,
            Err(e) => {
                tracing::warn!(
                    "Failed to load usage for conversation {}: {}",
                    conversation_id,
                    e
                );
                None
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FailingStore;

    impl UsageStore for FailingStore {
        fn save(&self, _: &ConversationId, _: &UsageSnapshot) -> Result<()> {
            Err(Error::Persistence("disk full".into()))
        }

        fn load(&self, _: &ConversationId) -> Result<Option<UsageSnapshot>> {
            Err(Error::Persistence("unreadable".into()))
        }
    }

    #[test]
    fn test_record_overwrites_and_persists() {
        let store = InMemoryUsageStore::new();
        let conv = ConversationId::new("c1");
        let mut acc = UsageAccumulator::default();

        assert!(acc.record(&conv, UsageSnapshot::new(10, 5), &store));
        assert!(acc.record(&conv, UsageSnapshot::new(20, 8), &store));
        assert_eq!(acc.last().unwrap().total_tokens, 28);
        assert_eq!(store.load(&conv).unwrap().unwrap().total_tokens, 28);
    }

    #[test]
    fn test_record_ignores_empty_snapshot() {
        let store = InMemoryUsageStore::new();
        let conv = ConversationId::new("c1");
        let mut acc = UsageAccumulator::default();
        acc.record(&conv, UsageSnapshot::new(1, 1), &store);

        assert!(!acc.record(&conv, UsageSnapshot::default(), &store));
        assert_eq!(acc.last().unwrap().total_tokens, 2);
    }

    #[test]
    fn test_record_survives_persistence_failure() {
        let conv = ConversationId::new("c1");
        let mut acc = UsageAccumulator::default();
        assert!(acc.record(&conv, UsageSnapshot::new(3, 4), &FailingStore));
        assert_eq!(acc.last().unwrap().total_tokens, 7);
    }

    #[test]
    fn test_restore_from_store() {
        let store = InMemoryUsageStore::new();
        let c1 = ConversationId::new("c1");
        let c2 = ConversationId::new("c2");
        store.save(&c1, &UsageSnapshot::new(100, 50)).unwrap();

        let mut acc = UsageAccumulator::default();
        acc.restore(&c1, &store);
        assert_eq!(acc.last().unwrap().total_tokens, 150);
        acc.restore(&c2, &store);
        assert!(acc.last().is_none());
    }

    #[test]
    fn test_restore_failure_clears() {
        let mut acc = UsageAccumulator::default();
        acc.record(&ConversationId::new("c1"), UsageSnapshot::new(1, 1), &InMemoryUsageStore::new());
        acc.restore(&ConversationId::new("c1"), &FailingStore);
        assert!(acc.last().is_none());
    }
}
