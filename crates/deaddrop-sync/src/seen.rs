//! Bounded set of already-processed remote entry names.
//!
//! Purely an optimization layer: it saves re-reading blobs the engine has
//! already ingested this session. Correctness never depends on it: the
//! cache's unique envelope identity is the authoritative deduplicator, so
//! trimming old names only costs a redundant read, never a duplicate row.

use std::collections::{HashSet, VecDeque};

use deaddrop_shared::constants::{SEEN_SET_CAPACITY, SEEN_SET_TRIM_TO};

#[derive(Debug, Default)]
pub struct SeenSet {
    names: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Record a processed entry name. Returns false if it was already there.
    pub fn insert(&mut self, name: &str) -> bool {
        if !self.names.insert(name.to_string()) {
            return false;
        }
        self.order.push_back(name.to_string());
        true
    }

    /// Drop the oldest names once the set grows past its capacity.
    pub fn trim(&mut self) {
        if self.order.len() <= SEEN_SET_CAPACITY {
            return;
        }
        while self.order.len() > SEEN_SET_TRIM_TO {
            if let Some(old) = self.order.pop_front() {
                self.names.remove(&old);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
