//! Event dispatch: routes each decoded line of an audit run by kind.
//!
//! Strictly one line at a time, in arrival order. Result batches are merged
//! into the dispatcher's own store, which is a working copy: the caller
//! commits it only if the run ends cleanly.

use tracing::{debug, info, warn};

use signaldesk_common::partition_records;

use crate::store::SignalStore;
use crate::stream::{DecodeFailure, StreamEvent};
use crate::trace::LogTrace;

/// Counters for one run, logged when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub events: usize,
    pub logs: usize,
    pub batches: usize,
    pub added: usize,
    pub updated: usize,
    pub rejected: usize,
    pub decode_failures: usize,
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} events ({} logs, {} batches): {} new, {} updated, {} rejected, {} undecodable",
            self.events,
            self.logs,
            self.batches,
            self.added,
            self.updated,
            self.rejected,
            self.decode_failures
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// An `error` event arrived; nothing after it may be processed.
    Halt,
}

pub struct Dispatcher {
    store: SignalStore,
    arrived: Vec<String>,
    stats: IngestStats,
    halted: Option<String>,
}

impl Dispatcher {
    pub fn new(store: SignalStore) -> Self {
        Self {
            store,
            arrived: Vec::new(),
            stats: IngestStats::default(),
            halted: None,
        }
    }

    pub fn dispatch(
        &mut self,
        decoded: Result<StreamEvent, DecodeFailure>,
        trace: &mut LogTrace,
    ) -> Flow {
        if self.halted.is_some() {
            return Flow::Halt;
        }

        let event = match decoded {
            Ok(event) => event,
            Err(failure) => {
                self.stats.decode_failures += 1;
                warn!(cause = %failure.cause, line = %failure.line, "Skipping undecodable stream line");
                return Flow::Continue;
            }
        };
        self.stats.events += 1;

        match event {
            StreamEvent::Log { message } => {
                self.stats.logs += 1;
                debug!(message = %message, "Audit log");
                trace.push(message);
            }
            StreamEvent::Result { data } => {
                self.stats.batches += 1;
                let (accepted, rejected) = partition_records(data);
                for (index, reason) in &rejected {
                    warn!(index, reason = %reason, "Rejected record in result batch");
                }
                self.stats.rejected += rejected.len();

                for signal in &accepted {
                    if !self.arrived.contains(&signal.signal_id) {
                        self.arrived.push(signal.signal_id.clone());
                    }
                }

                let merged = self.store.merge_insert(accepted);
                self.stats.added += merged.added;
                self.stats.updated += merged.updated;
                info!(
                    added = merged.added,
                    updated = merged.updated,
                    rejected = rejected.len(),
                    total = self.store.count(),
                    "Merged result batch"
                );
            }
            StreamEvent::Error { message } => {
                warn!(message = %message, "Backend reported error, halting run");
                self.halted = Some(message);
                return Flow::Halt;
            }
        }

        Flow::Continue
    }

    /// Message of the `error` event that halted the run, if any.
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Ids delivered by this run, first arrival first.
    pub fn arrived(&self) -> &[String] {
        &self.arrived
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    pub fn into_parts(self) -> (SignalStore, Vec<String>, IngestStats) {
        (self.store, self.arrived, self.stats)
    }
}
