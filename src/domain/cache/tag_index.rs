//! Tag to key membership index

use std::collections::HashSet;

use dashmap::DashMap;

/// Concurrent mapping from a tag to the fully-qualified keys written with it
///
/// Membership only: the index never owns or expires entries, so a key can
/// linger under a tag after the backend has expired it. Inserts go through
/// the shard entry lock, so concurrent additions to one tag are never lost.
#[derive(Debug, Default)]
pub struct TagIndex {
    tags: DashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key to a tag's set, creating the set if absent
    pub fn add_key_to_tag(&self, tag: &str, key: &str) {
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
    }

    /// Detaches and returns the tag's whole key set
    pub fn remove_tag(&self, tag: &str) -> HashSet<String> {
        self.tags
            .remove(tag)
            .map(|(_, keys)| keys)
            .unwrap_or_default()
    }

    /// Returns a copy of the keys currently under a tag
    pub fn keys_for(&self, tag: &str) -> HashSet<String> {
        self.tags
            .get(tag)
            .map(|keys| keys.value().clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, tag: &str, key: &str) -> bool {
        self.tags
            .get(tag)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Returns the tags that currently have members
    pub fn tags(&self) -> Vec<String> {
        self.tags.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
