//! Saved-fragment cache
//!
//! Short-lived store of a fragment's last rendered markup, keyed by item id.
//! Entries are produced by an explicit save and consumed the next time the
//! item is flushed, so a fragment preserved across a re-render cycle is
//! replayed without a server round-trip.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SavedFragmentCache {
    entries: HashMap<String, String>,
}

impl SavedFragmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store markup for an item, replacing any earlier save
    pub fn insert(&mut self, item_id: impl Into<String>, markup: impl Into<String>) {
        self.entries.insert(item_id.into(), markup.into());
    }

    /// Remove and return the saved markup for an item
    pub fn take(&mut self, item_id: &str) -> Option<String> {
        self.entries.remove(item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.entries.contains_key(item_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
