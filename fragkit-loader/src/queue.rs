//! Pending Queue
//!
//! Buffers enqueue intent until the next flush, bucketed by batch key.
//!
//! Invariants:
//! - Batch keys enumerate in first-insertion order
//! - An item id is pending in at most one bucket at a time

use std::collections::HashMap;
use std::fmt;

use crate::view::RenderCallback;

/// One pending item and the callbacks waiting on its render
pub struct QueuedItem {
    pub item_id: String,
    pub callbacks: Vec<RenderCallback>,
}

impl fmt::Debug for QueuedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedItem")
            .field("item_id", &self.item_id)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Insertion-ordered buckets of pending items
#[derive(Debug, Default)]
pub struct PendingQueue {
    /// (batch key, items) in key insertion order
    buckets: Vec<(String, Vec<QueuedItem>)>,

    /// item id -> index into `buckets`
    membership: HashMap<String, usize>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to the bucket for `batch_key`.
    ///
    /// An item that is already pending keeps its bucket and position; the
    /// callback is attached to the existing entry. Returns true when a new
    /// entry was created.
    pub fn push(
        &mut self,
        item_id: &str,
        batch_key: &str,
        callback: Option<RenderCallback>,
    ) -> bool {
        if let Some(&bucket) = self.membership.get(item_id) {
            let (existing_key, items) = &mut self.buckets[bucket];
            if existing_key.as_str() != batch_key {
                tracing::warn!(
                    item_id = %item_id,
                    pending_key = %existing_key,
                    requested_key = %batch_key,
                    "Item already pending under another batch key"
                );
            }
            if let Some(callback) = callback {
                if let Some(entry) = items.iter_mut().find(|i| i.item_id == item_id) {
                    entry.callbacks.push(callback);
                }
            }
            return false;
        }

        let bucket = match self.buckets.iter().position(|(key, _)| key == batch_key) {
            Some(index) => index,
            None => {
                self.buckets.push((batch_key.to_string(), Vec::new()));
                self.buckets.len() - 1
            }
        };

        self.buckets[bucket].1.push(QueuedItem {
            item_id: item_id.to_string(),
            callbacks: callback.into_iter().collect(),
        });
        self.membership.insert(item_id.to_string(), bucket);
        true
    }

    /// Empty the queue, returning every bucket in key order
    pub fn take_all(&mut self) -> Vec<(String, Vec<QueuedItem>)> {
        self.membership.clear();
        std::mem::take(&mut self.buckets)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.membership.contains_key(item_id)
    }

    /// Batch key an item is pending under
    pub fn batch_key_of(&self, item_id: &str) -> Option<&str> {
        self.membership
            .get(item_id)
            .map(|&bucket| self.buckets[bucket].0.as_str())
    }

    /// Number of pending items across all buckets
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.membership.clear();
    }
}
