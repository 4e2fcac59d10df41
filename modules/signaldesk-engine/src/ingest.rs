//! One audit run: the network byte stream driven through reassembly,
//! decoding and dispatch against a working copy of the store.
//!
//! The run never touches the live store. On a clean end of stream the caller
//! commits [`IngestReport::store`]; on a transport failure or a backend
//! `error` event the working copy is simply dropped.

use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use audit_client::{AuditError, ByteStream};

use crate::dispatch::{Dispatcher, Flow, IngestStats};
use crate::store::SignalStore;
use crate::stream::{decode, lines};
use crate::trace::LogTrace;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Transport(#[from] AuditError),

    #[error("{0}")]
    BackendReported(String),
}

/// What a successful run hands back for commit.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub store: SignalStore,
    /// Ids delivered by the run, first arrival first.
    pub arrived: Vec<String>,
    pub stats: IngestStats,
}

/// Where a run stands after one [`AuditRun::step`].
pub enum Progress {
    Running(AuditRun),
    Finished(Result<IngestReport, IngestError>),
}

pub struct AuditRun {
    run_id: Uuid,
    lines: BoxStream<'static, Result<String, AuditError>>,
    dispatcher: Dispatcher,
}

impl AuditRun {
    pub fn new(chunks: ByteStream, base: SignalStore) -> Self {
        let run_id = Uuid::new_v4();
        info!(%run_id, base = base.count(), "Audit run started");
        Self {
            run_id,
            lines: lines(chunks).boxed(),
            dispatcher: Dispatcher::new(base),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Await the next complete line. `None` is a clean end of stream.
    pub async fn next_line(&mut self) -> Option<Result<String, AuditError>> {
        self.lines.next().await
    }

    /// Decode and dispatch one line.
    fn handle_line(&mut self, line: &str, trace: &mut LogTrace) -> Flow {
        match decode(line) {
            None => Flow::Continue,
            Some(decoded) => self.dispatcher.dispatch(decoded, trace),
        }
    }

    /// Close out a run whose stream ended or halted.
    fn finish(self) -> Result<IngestReport, IngestError> {
        let stats = self.dispatcher.stats();
        if let Some(message) = self.dispatcher.halted() {
            warn!(run_id = %self.run_id, %stats, "Audit run aborted by backend");
            return Err(IngestError::BackendReported(message.to_string()));
        }

        info!(
            run_id = %self.run_id,
            %stats,
            arrived = self.dispatcher.arrived().len(),
            total = self.dispatcher.store().count(),
            "Audit run complete"
        );
        let (store, arrived, stats) = self.dispatcher.into_parts();
        Ok(IngestReport {
            store,
            arrived,
            stats,
        })
    }

    /// Abandon the run after a transport failure.
    fn abort(self, err: AuditError) -> IngestError {
        warn!(run_id = %self.run_id, error = %err, stats = %self.dispatcher.stats(), "Audit run lost its stream");
        IngestError::Transport(err)
    }

    /// Apply one result of [`AuditRun::next_line`]: a line keeps the run
    /// going unless it halts it, end of stream finishes it, a transport error
    /// aborts it.
    pub fn step(
        mut self,
        line: Option<Result<String, AuditError>>,
        trace: &mut LogTrace,
    ) -> Progress {
        match line {
            Some(Ok(line)) => match self.handle_line(&line, trace) {
                Flow::Continue => Progress::Running(self),
                Flow::Halt => Progress::Finished(self.finish()),
            },
            Some(Err(err)) => Progress::Finished(Err(self.abort(err))),
            None => Progress::Finished(self.finish()),
        }
    }
}
