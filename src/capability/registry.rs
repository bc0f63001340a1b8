use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Capability;

/// Identity of a registered capability: its registration slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityId(pub usize);

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only set of capabilities, built once at startup.
pub struct CapabilityRegistry {
    entries: Vec<Arc<dyn Capability>>,
    /// Normalized keyword -> capabilities declaring it, in registration order.
    keywords: Vec<(String, Vec<CapabilityId>)>,
    fallbacks: Vec<CapabilityId>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Arc<dyn Capability>>,
}

impl RegistryBuilder {
    pub fn register<C: Capability + 'static>(self, capability: C) -> Self {
        self.register_arc(Arc::new(capability))
    }

    pub fn register_arc(mut self, capability: Arc<dyn Capability>) -> Self {
        self.entries.push(capability);
        self
    }

    pub fn build(self) -> CapabilityRegistry {
        let mut keywords: Vec<(String, Vec<CapabilityId>)> = Vec::new();
        let mut fallbacks = Vec::new();
        let mut names = HashSet::new();

        for (slot, capability) in self.entries.iter().enumerate() {
            let id = CapabilityId(slot);
            if !names.insert(capability.name().to_string()) {
                warn!("Registry: duplicate capability name '{}' ({})", capability.name(), id);
            }

            let triggers: Vec<String> = capability
                .triggers()
                .iter()
                .map(|t| normalize_keyword(t))
                .filter(|t| !t.is_empty())
                .collect();

            if triggers.is_empty() {
                fallbacks.push(id);
                continue;
            }

            for keyword in triggers {
                match keywords.iter_mut().find(|(k, _)| *k == keyword) {
                    Some((_, ids)) if !ids.contains(&id) => ids.push(id),
                    Some(_) => {}
                    None => keywords.push((keyword, vec![id])),
                }
            }
        }

        let registry = CapabilityRegistry {
            entries: self.entries,
            keywords,
            fallbacks,
        };
        registry.log_summary();
        registry
    }
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: CapabilityId) -> Option<&Arc<dyn Capability>> {
        self.entries.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CapabilityId, &Arc<dyn Capability>)> {
        self.entries.iter().enumerate().map(|(i, c)| (CapabilityId(i), c))
    }

    pub fn keywords(&self) -> &[(String, Vec<CapabilityId>)] {
        &self.keywords
    }

    /// Capabilities without trigger keywords, tried last by the dispatcher.
    pub fn fallbacks(&self) -> &[CapabilityId] {
        &self.fallbacks
    }

    /// First capability that owns scheduled tasks of `task_type`.
    pub fn by_task_type(&self, task_type: &str) -> Option<(CapabilityId, &Arc<dyn Capability>)> {
        self.iter().find(|(_, c)| c.task_type() == Some(task_type))
    }

    pub fn name_of(&self, id: CapabilityId) -> &str {
        self.get(id).map(|c| c.name()).unwrap_or("<unknown>")
    }

    fn log_summary(&self) {
        let mut names: Vec<&str> = self.entries.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        info!("Registry: {} capabilities loaded: [{}]", self.entries.len(), names.join(", "));
        debug!(
            "Registry: {} trigger keywords, {} fallbacks",
            self.keywords.len(),
            self.fallbacks.len()
        );
    }
}

/// Lowercase and collapse whitespace.
pub(crate) fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
