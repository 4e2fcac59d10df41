//! Deduplicated, identity-keyed signal collection.
//!
//! At most one record per `signal_id`, always. Re-delivery replaces the whole
//! record (last write wins) and moves it to the front; records a merge does
//! not touch keep their relative order.

use std::collections::HashSet;

use signaldesk_common::Signal;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalStore {
    records: Vec<Signal>,
}

/// Outcome of one merge, in the backend's "N new, M updated" terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_signals(signals: Vec<Signal>) -> Self {
        let mut store = Self::new();
        store.load_snapshot(signals);
        store
    }

    /// Insert or replace each signal. The merged batch lands at the front in
    /// batch order; an id repeated within the batch keeps its last record.
    pub fn merge_insert(&mut self, signals: Vec<Signal>) -> MergeStats {
        let (batch, ids) = collapse(signals);
        if batch.is_empty() {
            return MergeStats::default();
        }

        let before = self.records.len();
        self.records.retain(|r| !ids.contains(&r.signal_id));
        let updated = before - self.records.len();

        let stats = MergeStats {
            added: batch.len() - updated,
            updated,
        };

        let untouched = std::mem::replace(&mut self.records, batch);
        self.records.extend(untouched);
        stats
    }

    /// Replace the whole collection, e.g. from a persisted snapshot or a
    /// catalog fetch. Duplicates in the input collapse like a merge.
    pub fn load_snapshot(&mut self, signals: Vec<Signal>) {
        self.records = collapse(signals).0;
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids in presentation order.
    pub fn all_ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.signal_id.clone()).collect()
    }

    pub fn contains(&self, signal_id: &str) -> bool {
        self.records.iter().any(|r| r.signal_id == signal_id)
    }

    pub fn get(&self, signal_id: &str) -> Option<&Signal> {
        self.records.iter().find(|r| r.signal_id == signal_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.records.iter()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.records
    }
}

/// Drop earlier duplicates, keeping each id's last record in its last position.
fn collapse(signals: Vec<Signal>) -> (Vec<Signal>, HashSet<String>) {
    let mut seen = HashSet::with_capacity(signals.len());
    let mut kept: Vec<Signal> = signals
        .into_iter()
        .rev()
        .filter(|s| seen.insert(s.signal_id.clone()))
        .collect();
    kept.reverse();
    (kept, seen)
}
