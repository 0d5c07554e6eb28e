//! Effective presence across connected resources.
//!
//! A buddy may be connected from several resources at once, each reporting
//! its own presence and priority. The resolver keeps one entry per resource,
//! bucketed by priority, and picks the single presence that represents the
//! buddy: the highest priority bucket wins; inside it the resource-less entry
//! wins, otherwise the entry added most recently.

use parley_proto::Presence;
use std::collections::BTreeMap;

/// Resource name used when a presence arrives without one.
const NO_RESOURCE: &str = "";

#[derive(Debug, Clone, Default)]
pub struct PresenceResolver {
    by_priority: BTreeMap<i8, Vec<(String, Presence)>>,
}

impl PresenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presence for `resource`, replacing whatever it reported before.
    pub fn add_presence_update(&mut self, resource: Option<&str>, presence: Presence) {
        let resource = resource.unwrap_or(NO_RESOURCE);
        self.remove_presence(Some(resource));
        self.by_priority
            .entry(presence.priority)
            .or_default()
            .push((resource.to_string(), presence));
    }

    /// Forget `resource` at every priority.
    pub fn remove_presence(&mut self, resource: Option<&str>) {
        let resource = resource.unwrap_or(NO_RESOURCE);
        self.by_priority.retain(|_, entries| {
            entries.retain(|(name, _)| name != resource);
            !entries.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.by_priority.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_priority.is_empty()
    }

    /// Resources currently reporting, highest priority first.
    pub fn resources(&self) -> Vec<String> {
        self.by_priority
            .values()
            .rev()
            .flat_map(|entries| entries.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    pub fn effective_presence(&self) -> Presence {
        let Some((_, entries)) = self.by_priority.last_key_value() else {
            return Presence::offline();
        };
        entries
            .iter()
            .find(|(name, _)| name == NO_RESOURCE)
            .or_else(|| entries.last())
            .map(|(_, presence)| presence.clone())
            .unwrap_or_else(Presence::offline)
    }
}
