//! Resource catalog: which serving targets each provider can route to.

use crate::{Provider, ResourceCandidate, ResourceId, Tier};

struct ResourceEntry {
    id: &'static str,
    provider: Provider,
    tier: Tier,
}

impl ResourceEntry {
    fn to_candidate(&self) -> ResourceCandidate {
        ResourceCandidate::new(self.id, self.tier)
    }
}

const RESOURCE_ENTRIES: &[ResourceEntry] = &[
    ResourceEntry {
        id: "gemini-2.5-pro",
        provider: Provider::Gemini,
        tier: Tier::Pro,
    },
    ResourceEntry {
        id: "gemini-2.5-flash",
        provider: Provider::Gemini,
        tier: Tier::Standard,
    },
    ResourceEntry {
        id: "gemini-2.5-flash-lite",
        provider: Provider::Gemini,
        tier: Tier::Lite,
    },
    ResourceEntry {
        id: "claude-opus-4-1",
        provider: Provider::Anthropic,
        tier: Tier::Pro,
    },
    ResourceEntry {
        id: "claude-sonnet-4-5",
        provider: Provider::Anthropic,
        tier: Tier::Standard,
    },
    ResourceEntry {
        id: "claude-haiku-4-5",
        provider: Provider::Anthropic,
        tier: Tier::Lite,
    },
    ResourceEntry {
        id: "gpt-5",
        provider: Provider::OpenAI,
        tier: Tier::Pro,
    },
    ResourceEntry {
        id: "gpt-5-codex",
        provider: Provider::OpenAI,
        tier: Tier::Standard,
    },
    ResourceEntry {
        id: "gpt-5-mini",
        provider: Provider::OpenAI,
        tier: Tier::Lite,
    },
];

/// Get all resources usable by a specific provider.
pub fn get_resources(provider: Provider) -> Vec<ResourceCandidate> {
    RESOURCE_ENTRIES
        .iter()
        .filter(|e| e.provider == provider)
        .map(|e| e.to_candidate())
        .collect()
}

/// Default resource for a provider: its highest tier entry.
pub fn default_resource(provider: Provider) -> Option<ResourceCandidate> {
    get_resources(provider)
        .into_iter()
        .max_by_key(|c| c.tier.score())
}

/// Resolve a resource id against a provider's catalog, inferring the tier for
/// ids the catalog does not know.
pub fn resolve(provider: Provider, id: &str) -> ResourceCandidate {
    get_resources(provider)
        .into_iter()
        .find(|c| c.id == ResourceId::new(id))
        .unwrap_or_else(|| ResourceCandidate::inferred(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_resources_by_provider() {
        let gemini = get_resources(Provider::Gemini);
        assert_eq!(gemini.len(), 3);
        assert!(get_resources(Provider::Custom).is_empty());
    }

    #[test]
    fn test_default_resource_is_highest_tier() {
        let r = default_resource(Provider::Gemini).unwrap();
        assert_eq!(r.id.as_str(), "gemini-2.5-pro");
        assert!(default_resource(Provider::Custom).is_none());
    }

    #[test]
    fn test_resolve_unknown_id_infers_tier() {
        let r = resolve(Provider::Gemini, "gemini-3-pro-preview");
        assert_eq!(r.tier, Tier::Pro);
        let r = resolve(Provider::Gemini, "gemini-2.5-flash");
        assert_eq!(r.tier, Tier::Standard);
    }
}
