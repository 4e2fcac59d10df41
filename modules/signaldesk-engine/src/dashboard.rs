//! The dashboard event loop.
//!
//! One task owns everything: the reveal machine, the active audit run and the
//! output. It wakes on a user command, a timer message, or the next line of
//! the run, handles that one thing to completion and redraws if the view
//! changed.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver};
use tracing::{info, warn};

use audit_client::{AuditError, AuditFiles, UploadFiles};
use signaldesk_common::{partition_records, RevealConfig};

use crate::ingest::{AuditRun, IngestError, Progress};
use crate::reveal::{RevealMachine, ScanOutcome};
use crate::session::SessionStorage;
use crate::timer::TimerEvent;
use crate::traits::AuditSource;
use crate::view::{DashboardView, SignalDetail};

pub const USAGE: &str = "commands: scan | analyze [sales context backlog] | \
upload <sales> <context> <backlog> | refresh | show <signal_id> | signout | quit";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reveal signals already known but not yet shown.
    Scan,
    /// Run a live audit, optionally against specific input files.
    Analyze(AuditFiles),
    /// Upload input files, then audit them.
    Upload(UploadFiles),
    /// Reload the stored catalog.
    Refresh,
    Show(String),
    SignOut,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut words = input.split_whitespace();
        let Some(name) = words.next() else {
            return Err(CommandError::Empty);
        };
        let args: Vec<&str> = words.collect();

        match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("scan", []) => Ok(Command::Scan),
            ("analyze" | "audit", []) => Ok(Command::Analyze(AuditFiles::default())),
            ("analyze" | "audit", [sales, context, backlog]) => Ok(Command::Analyze(AuditFiles {
                sales: Some(sales.to_string()),
                context: Some(context.to_string()),
                backlog: Some(backlog.to_string()),
            })),
            ("analyze" | "audit", _) => Err(CommandError::Usage("analyze [sales context backlog]")),
            ("upload", [sales, context, backlog]) => Ok(Command::Upload(UploadFiles {
                sales: PathBuf::from(sales),
                context: PathBuf::from(context),
                backlog: PathBuf::from(backlog),
            })),
            ("upload", _) => Err(CommandError::Usage("upload <sales> <context> <backlog>")),
            ("refresh", []) => Ok(Command::Refresh),
            ("show", [id]) => Ok(Command::Show(id.to_string())),
            ("show", _) => Err(CommandError::Usage("show <signal_id>")),
            ("signout" | "sign-out" | "logout", []) => Ok(Command::SignOut),
            ("quit" | "exit", []) => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(input.trim().to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

enum Wake {
    Command(Option<Command>),
    Timer(TimerEvent),
    Line(Option<Result<String, AuditError>>),
}

pub struct Dashboard<A: AuditSource> {
    source: A,
    machine: RevealMachine,
    timer_rx: UnboundedReceiver<TimerEvent>,
    active: Option<AuditRun>,
    /// Filenames returned by the last upload, used by a bare `analyze`.
    uploaded: Option<AuditFiles>,
    out: Box<dyn Write + Send>,
    drawn: Option<DashboardView>,
}

impl<A: AuditSource> Dashboard<A> {
    /// Restore the session and, if it holds no signals, hydrate the catalog.
    pub async fn start(
        source: A,
        config: RevealConfig,
        session: Box<dyn SessionStorage>,
        out: Box<dyn Write + Send>,
    ) -> Result<Self> {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let machine = RevealMachine::restore(config, session, timer_tx, Utc::now());

        let mut dashboard = Self {
            source,
            machine,
            timer_rx,
            active: None,
            uploaded: None,
            out,
            drawn: None,
        };

        if dashboard.machine.store().is_empty() {
            dashboard.refresh().await?;
        }
        dashboard.redraw()?;
        Ok(dashboard)
    }

    pub fn machine(&self) -> &RevealMachine {
        &self.machine
    }

    /// Process commands until `quit` or the command channel closes.
    pub async fn run(&mut self, mut commands: Receiver<Command>) -> Result<()> {
        loop {
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                Some(event) = self.timer_rx.recv() => Wake::Timer(event),
                line = next_line(&mut self.active) => Wake::Line(line),
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(Command::Quit)) => break,
                Wake::Command(Some(command)) => self.handle_command(command).await?,
                Wake::Timer(event) => {
                    self.machine.on_timer(event, Utc::now());
                }
                Wake::Line(line) => self.handle_line(line),
            }
            self.redraw()?;
        }

        if let Some(run) = self.active.take() {
            info!(run_id = %run.run_id(), "Abandoning audit run on exit");
        }
        Ok(())
    }

    /// Cancel every timer and hand the session back.
    pub fn teardown(self) -> Box<dyn SessionStorage> {
        self.machine.teardown()
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Scan => match self.machine.trigger_scan() {
                ScanOutcome::Busy => writeln!(self.out, "A scan is already running.")?,
                ScanOutcome::Started | ScanOutcome::NothingNew => {}
            },
            Command::Analyze(files) => {
                let files = if files.is_empty() {
                    self.uploaded.clone().unwrap_or_default()
                } else {
                    files
                };
                self.analyze(files).await?;
            }
            Command::Upload(files) => {
                if self.machine.is_busy() {
                    writeln!(self.out, "A scan is already running.")?;
                    return Ok(());
                }
                match self.source.upload(&files).await {
                    Ok(names) => {
                        info!(?names, "Files uploaded");
                        self.uploaded = Some(names.clone());
                        self.analyze(names).await?;
                    }
                    Err(e) => {
                        warn!(error = %e, "Upload failed");
                        writeln!(self.out, "Upload failed: {e}")?;
                    }
                }
            }
            Command::Refresh => {
                if self.machine.is_busy() {
                    writeln!(self.out, "A scan is already running.")?;
                } else {
                    self.refresh().await?;
                }
            }
            Command::Show(id) => {
                let visible = self.machine.state().visible_ids.contains(&id);
                match self.machine.store().get(&id).filter(|_| visible) {
                    Some(signal) => write!(self.out, "{}", SignalDetail(signal))?,
                    None => writeln!(self.out, "No visible signal `{id}`.")?,
                }
            }
            Command::SignOut => {
                self.active = None;
                self.uploaded = None;
                self.machine.sign_out();
            }
            Command::Quit => {}
        }
        Ok(())
    }

    async fn analyze(&mut self, files: AuditFiles) -> Result<()> {
        let Some(base) = self.machine.begin_ingest() else {
            writeln!(self.out, "A scan is already running.")?;
            return Ok(());
        };

        match self.source.start_audit(&files).await {
            Ok(chunks) => self.active = Some(AuditRun::new(chunks, base)),
            Err(e) => self.machine.fail_ingest(&IngestError::from(e)),
        }
        Ok(())
    }

    fn handle_line(&mut self, line: Option<Result<String, AuditError>>) {
        let Some(run) = self.active.take() else {
            return;
        };

        match run.step(line, self.machine.trace_mut()) {
            Progress::Running(run) => self.active = Some(run),
            Progress::Finished(Ok(report)) => self.machine.complete_ingest(report, Utc::now()),
            Progress::Finished(Err(e)) => self.machine.fail_ingest(&e),
        }
    }

    /// Reload the catalog. A backend failure is reported, not fatal.
    async fn refresh(&mut self) -> Result<()> {
        match self.source.fetch_catalog().await {
            Ok(records) => {
                let (signals, rejected) = partition_records(records);
                for (index, reason) in &rejected {
                    warn!(index, reason = %reason, "Rejected catalog record");
                }
                self.machine.load_catalog(signals);
            }
            Err(e) => {
                warn!(error = %e, "Catalog fetch failed");
                writeln!(self.out, "Could not load signals: {e}")?;
            }
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let view = self.machine.view(Utc::now());
        if self.drawn.as_ref() != Some(&view) {
            write!(self.out, "{view}")?;
            self.out.flush()?;
            self.drawn = Some(view);
        }
        Ok(())
    }
}

async fn next_line(active: &mut Option<AuditRun>) -> Option<Result<String, AuditError>> {
    match active {
        Some(run) => run.next_line().await,
        None => std::future::pending().await,
    }
}
