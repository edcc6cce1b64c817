//! Diff Tracker
//!
//! In-memory record of the mutations a batch has staged but not yet applied.
//!
//! ## Ordering
//! Entries iterate in the order their key was *first* written. Overwriting a
//! key replaces its entry in place, so replaying a diff onto a backend is
//! reproducible for a given sequence of batch calls.

use std::collections::HashMap;

/// A pending mutation for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    /// Upsert the key with this value
    Set(Vec<u8>),

    /// Remove the key (tombstone)
    Delete,
}

impl DiffEntry {
    /// Whether this entry is a tombstone
    pub fn is_delete(&self) -> bool {
        matches!(self, DiffEntry::Delete)
    }
}

/// Ordered mapping from key to pending mutation
#[derive(Debug, Default, Clone)]
pub struct Diff {
    /// Entries in first-write order
    entries: Vec<(Vec<u8>, DiffEntry)>,

    /// Key -> position in `entries`
    index: HashMap<Vec<u8>, usize>,
}

impl Diff {
    /// Create an empty diff
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an upsert
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.record(key, DiffEntry::Set(value));
    }

    /// Stage a tombstone
    pub fn delete(&mut self, key: Vec<u8>) {
        self.record(key, DiffEntry::Delete);
    }

    fn record(&mut self, key: Vec<u8>, entry: DiffEntry) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = entry,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, entry));
            }
        }
    }

    /// Pending entry for `key`, or `None` when the key was never written
    pub fn get(&self, key: &[u8]) -> Option<&DiffEntry> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// Iterate entries in first-write order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &DiffEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_slice(), e))
    }

    /// Number of distinct keys staged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every staged entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
