//! Ordered set of publishes awaiting confirmation.

use crate::{ConfirmError, ConfirmResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::trace;

/// Publishes that were submitted but not yet acked or nacked, keyed by
/// sequence number.
///
/// Insert and resolve may be called concurrently from the publishing loop and
/// the confirm callback path. The lock is only held for the duration of a
/// single map operation.
pub struct OutstandingSet<D> {
    entries: Mutex<BTreeMap<u64, D>>,
}

impl<D> Default for OutstandingSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> OutstandingSet<D> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a publish that is about to be sent.
    ///
    /// Sequence numbers must be unique; a repeated number means the correlation
    /// between publishes and confirms is already broken.
    pub fn insert(&self, sequence: u64, descriptor: D) -> ConfirmResult<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&sequence) {
            return Err(ConfirmError::DuplicateSequence(sequence));
        }
        entries.insert(sequence, descriptor);
        Ok(())
    }

    /// Remove every entry with a sequence number `<= sequence`.
    ///
    /// Returns how many entries were removed. Work is proportional to that
    /// count, settled entries below the bound are never rescanned.
    pub fn resolve_up_to(&self, sequence: u64) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;
        while let Some(entry) = entries.first_entry() {
            if *entry.key() > sequence {
                break;
            }
            entry.remove();
            removed += 1;
        }
        trace!(sequence, removed, "Resolved outstanding range");
        removed
    }

    /// Remove the entry at `sequence`, if any.
    ///
    /// A missing entry is not an error: a cumulative confirm may already have
    /// covered it.
    pub fn resolve_one(&self, sequence: u64) -> bool {
        self.entries.lock().remove(&sequence).is_some()
    }

    /// Number of outstanding publishes.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is waiting for a confirm.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Lowest outstanding sequence number.
    pub fn first_outstanding(&self) -> Option<u64> {
        self.entries.lock().keys().next().copied()
    }

    /// Whether `sequence` is still outstanding.
    pub fn contains(&self, sequence: u64) -> bool {
        self.entries.lock().contains_key(&sequence)
    }
}

impl<D: Clone> OutstandingSet<D> {
    /// Copy of the descriptor recorded for `sequence`.
    pub fn descriptor(&self, sequence: u64) -> Option<D> {
        self.entries.lock().get(&sequence).cloned()
    }
}
