//! Quota/capacity failure detection and fallback resource selection.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tern_ai::{RequestId, ResourceCandidate, ResourceId};

/// Terms saying the resource itself is used up.
static QUOTA_TERMS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)quota",
        r"(?i)resource.?exhausted",
        r"(?i)no.?capacity",
        r"(?i)capacity.?exhausted",
        r"(?i)insufficient.?capacity",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Terms saying a limit was hit.
static LIMIT_TERMS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)limit", r"(?i)exceed", r"\b429\b"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Check if error text reports quota or capacity exhaustion.
///
/// Both a quota term and a limit term must appear; either alone is too
/// common in unrelated errors. Vocabulary outside both lists is not
/// recognized.
pub fn is_quota_exhausted(text: &str) -> bool {
    QUOTA_TERMS.iter().any(|re| re.is_match(text)) && LIMIT_TERMS.iter().any(|re| re.is_match(text))
}

/// Pick the best remaining resource.
///
/// Excludes `current` and everything in `exhausted`, then ranks by tier
/// score (highest first) and identifier (lexicographic) to stay
/// deterministic.
pub fn select_fallback(
    current: &ResourceId,
    resources: &[ResourceCandidate],
    exhausted: &BTreeSet<ResourceId>,
) -> Option<ResourceCandidate> {
    resources
        .iter()
        .filter(|c| &c.id != current && !exhausted.contains(&c.id))
        .min_by(|a, b| {
            b.tier
                .score()
                .cmp(&a.tier.score())
                .then_with(|| a.id.cmp(&b.id))
        })
        .cloned()
}

/// Result of handling a quota failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// Route subsequent requests to `to`
    Switched { from: ResourceId, to: ResourceCandidate },
    /// Every candidate is exhausted
    NoFallback { resource: ResourceId },
    /// This failed request was already handled
    AlreadyHandled,
}

/// Per-conversation exhausted-resource bookkeeping
#[derive(Debug, Default)]
pub struct FallbackSelector {
    exhausted: BTreeSet<ResourceId>,
    last_handled: Option<RequestId>,
}

impl FallbackSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources that failed with quota errors in this conversation
    pub fn exhausted(&self) -> &BTreeSet<ResourceId> {
        &self.exhausted
    }

    /// Mark `current` exhausted and choose its replacement.
    ///
    /// Repeats of the most recent failed request are ignored; failures
    /// without a request id cannot be deduplicated and are always handled.
    pub fn on_quota_failure(
        &mut self,
        request_id: Option<&RequestId>,
        current: &ResourceId,
        resources: &[ResourceCandidate],
    ) -> FallbackOutcome {
        if let Some(id) = request_id {
            if self.last_handled.as_ref() == Some(id) {
                return FallbackOutcome::AlreadyHandled;
            }
            self.last_handled = Some(id.clone());
        }
        self.exhausted.insert(current.clone());

        match select_fallback(current, resources, &self.exhausted) {
            Some(next) => FallbackOutcome::Switched {
                from: current.clone(),
                to: next,
            },
            None => FallbackOutcome::NoFallback {
                resource: current.clone(),
            },
        }
    }

}
