//! Write sets for incremental persistence.
//!
//! Every mutating path marks the keys it touched. The database then reads the
//! current value of each marked key (or its absence) and writes only those
//! rows, so the cost of one block is bounded by what that block changed.

use std::collections::BTreeSet;

/// Keys written since the last commit.
///
/// Two write sets always compare equal: the set is bookkeeping for the
/// database, not part of the value it belongs to.
#[derive(Debug, Clone)]
pub struct WriteSet<K: Ord>(BTreeSet<K>);

impl<K: Ord> Default for WriteSet<K> {
    fn default() -> Self {
        WriteSet(BTreeSet::new())
    }
}

impl<K: Ord> PartialEq for WriteSet<K> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<K: Ord> Eq for WriteSet<K> {}

impl<K: Ord> WriteSet<K> {
    pub fn touch(&mut self, key: K) {
        self.0.insert(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
