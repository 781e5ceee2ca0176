//! Tag Index
//!
//! Bidirectional mapping between tags and member keys: the forward map
//! (tag → keys) drives group eviction, the reverse map (key → tags)
//! cleans up memberships when a single key is evicted.
//!
//! Both directions are sharded, forward by tag and reverse by key, and
//! every operation locks one shard at a time, so concurrent puts and
//! tag sweeps on unrelated tags never serialize. Forward sets are
//! `BTreeSet`s so sweep order is deterministic.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;

use super::SHARD_COUNT;

type TagShard = RwLock<HashMap<String, BTreeSet<String>>>;
type KeyShard = RwLock<HashMap<String, HashSet<String>>>;

/// Bidirectional tag ↔ key index
pub struct TagIndex {
    by_tag: Vec<TagShard>,
    by_key: Vec<KeyShard>,
}

impl TagIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            by_tag: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            by_key: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn hash_index(value: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        (hasher.finish() as usize) & (SHARD_COUNT - 1)
    }

    fn tag_shard(&self, tag: &str) -> &TagShard {
        &self.by_tag[Self::hash_index(tag)]
    }

    fn key_shard(&self, key: &str) -> &KeyShard {
        &self.by_key[Self::hash_index(key)]
    }

    /// Replace the key's tag membership with exactly `tags`, diffing
    /// against the previous set so stale memberships are dropped.
    pub fn replace(&self, key: &str, tags: &HashSet<String>) {
        let previous = {
            let mut shard = self.key_shard(key).write();
            if tags.is_empty() {
                shard.remove(key).unwrap_or_default()
            } else {
                shard.insert(key.to_string(), tags.clone()).unwrap_or_default()
            }
        };

        for stale in previous.difference(tags) {
            self.drop_member(stale, key);
        }
        for added in tags.difference(&previous) {
            self.tag_shard(added)
                .write()
                .entry(added.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Remove the key from every tag set it belongs to, then drop the
    /// reverse mapping. Returns the tags it was a member of.
    pub fn remove(&self, key: &str) -> HashSet<String> {
        let tags = self.key_shard(key).write().remove(key).unwrap_or_default();
        for tag in &tags {
            self.drop_member(tag, key);
        }
        tags
    }

    /// Keys currently in the tag's set, in lexical order
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tag_shard(tag)
            .read()
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tags the key currently belongs to
    pub fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.key_shard(key).read().get(key).cloned().unwrap_or_default()
    }

    /// Drop the tag entry itself, after a sweep has cleared its members
    pub fn remove_tag(&self, tag: &str) {
        self.tag_shard(tag).write().remove(tag);
    }

    fn drop_member(&self, tag: &str, key: &str) {
        let mut shard = self.tag_shard(tag).write();
        if let Some(keys) = shard.get_mut(tag) {
            keys.remove(key);
            if keys.is_empty() {
                shard.remove(tag);
            }
        }
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
