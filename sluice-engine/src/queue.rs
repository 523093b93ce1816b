//! Transfer queue and advancement policy
//!
//! The queue owns the entries and all sequencing decisions. Order is
//! insertion order at enqueue time, altered only by rotate-on-success
//! (a completed entry moves from head to tail instead of being deleted,
//! so the history of a session stays visible to observers).
//!
//! All state mutation happens through the transition methods below, which
//! the engine calls while applying executor events. That keeps the queue a
//! single-writer store and gives one place to enforce the invariant that
//! at most one entry is ever in flight.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::{Entry, EntrySnapshot, EntryState};

// =============================================================================
// Failure Policy
// =============================================================================

/// What the queue does after a failed transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The failed entry stays at the head and the queue stops advancing.
    /// A failed transfer blocks further work rather than silently skipping
    /// it; resuming requires `reset` or `remove`.
    #[default]
    Halt,
    /// The failed entry rotates to the tail in `Failed` state and the
    /// queue keeps advancing.
    SkipAndContinue,
}

// =============================================================================
// Transfer Queue
// =============================================================================

/// Ordered collection of entries plus the scheduling policy
#[derive(Debug)]
pub struct TransferQueue {
    entries: VecDeque<Entry>,
    policy: FailurePolicy,
}

impl TransferQueue {
    /// Create an empty queue with the given failure policy
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            policy,
        }
    }

    /// Append new entries to the tail
    ///
    /// Safe to call while a transfer is in flight: it only appends, and
    /// dispatch remains guarded by the head-state check in
    /// `dispatchable_head`.
    pub fn enqueue(&mut self, new_entries: Vec<Entry>) {
        debug_assert!(new_entries.iter().all(|e| e.state == EntryState::Queued));
        self.entries.extend(new_entries);
    }

    /// Entry to dispatch next, if any
    ///
    /// Returns the head's id only when the head is `Queued`. An empty
    /// queue, a head already in flight, or a failed head left in place by
    /// the halt policy all yield None, which makes repeated scheduling
    /// calls no-ops.
    pub fn dispatchable_head(&self) -> Option<Uuid> {
        let head = self.entries.front()?;
        (head.state == EntryState::Queued).then_some(head.id)
    }

    /// Number of entries currently in flight (0 or 1 by invariant)
    pub fn transferring_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state.is_active()).count()
    }

    /// Transition an entry into `Transferring`
    ///
    /// Refused when another entry is already in flight or the entry is not
    /// queued. This is the single point where the one-in-flight invariant
    /// is enforced.
    pub fn mark_started(&mut self, id: Uuid, now_ms: i64) -> bool {
        if self.transferring_count() != 0 {
            return false;
        }
        match self.find_mut(id) {
            Some(entry) => entry.start(now_ms),
            None => false,
        }
    }

    /// Apply one progress sample to an in-flight entry
    pub fn record_progress(
        &mut self,
        id: Uuid,
        loaded_bytes: u64,
        total_bytes: u64,
        size_known: bool,
        rate: Option<f64>,
    ) -> bool {
        match self.find_mut(id) {
            Some(entry) => entry.record_progress(loaded_bytes, total_bytes, size_known, rate),
            None => false,
        }
    }

    /// Transition an entry into `Transferred` and rotate it to the tail
    ///
    /// The relative order of every other entry is preserved.
    pub fn mark_succeeded(&mut self, id: Uuid, now_ms: i64) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        if !self.entries[pos].complete(now_ms) {
            return false;
        }
        self.rotate_to_tail(pos);
        true
    }

    /// Transition an entry into `Failed` and apply the failure policy
    ///
    /// Under `Halt` the entry stays where it is - at the head, blocking
    /// dispatch. Under `SkipAndContinue` it rotates to the tail so the
    /// next entry becomes dispatchable.
    pub fn mark_failed(&mut self, id: Uuid, now_ms: i64, message: String) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        if !self.entries[pos].fail(now_ms, message) {
            return false;
        }
        if self.policy == FailurePolicy::SkipAndContinue {
            self.rotate_to_tail(pos);
        }
        true
    }

    /// Re-queue a failed entry in place so the queue can resume
    pub fn reset(&mut self, id: Uuid) -> bool {
        match self.find_mut(id) {
            Some(entry) => entry.requeue(),
            None => false,
        }
    }

    /// Remove a terminal entry from the queue
    ///
    /// Entries that are queued or in flight cannot be removed.
    pub fn remove(&mut self, id: Uuid) -> Option<Entry> {
        let pos = self.position(id)?;
        if !self.entries[pos].state.is_terminal() {
            return None;
        }
        self.entries.remove(pos)
    }

    /// Get an entry by id
    pub fn get(&self, id: Uuid) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// All entries in queue order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Serializable views of all entries, in queue order
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.entries.iter().map(Entry::snapshot).collect()
    }

    /// Number of entries in the queue
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the queue holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the queue, yielding the entries in final order
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries.into()
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    fn rotate_to_tail(&mut self, pos: usize) {
        if let Some(entry) = self.entries.remove(pos) {
            self.entries.push_back(entry);
        }
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new(FailurePolicy::Halt)
    }
}

// =============================================================================
// Tests
// =============================================================================
