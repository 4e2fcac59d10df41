//! Staged reveal of the signal catalog.
//!
//! The machine owns the store, the reveal state, the log trace and every
//! timer that drives them. It checkpoints into session storage after each
//! mutation and is rebuilt from it with [`RevealMachine::restore`], so a
//! restart mid-session resumes where it left off.
//!
//! ```text
//! Idle ──catalog──▶ Partial ──prompt timer──▶ PromptArmed
//!                     │                           │
//!                     └────────── scan ───────────┤
//!                                                 ▼
//!                         Full ◀──pacing done── Revealing ◀── analyze
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use signaldesk_common::{RevealConfig, Signal};

use crate::ingest::{IngestError, IngestReport};
use crate::session::{SessionSnapshot, SessionStorage};
use crate::store::SignalStore;
use crate::timer::{TimerEvent, TimerKind, TimerSlot};
use crate::trace::LogTrace;
use crate::view::{DashboardView, SignalRow};

/// Script played into the log trace while a scan reveals hidden signals.
pub const SCAN_SCRIPT: [&str; 8] = [
    "[Analyst] Scanning sales_2025.csv for statistical anomalies...",
    "[Analyst] Detected: Revenue Drop > 30% in APAC region.",
    "[Investigator] Cross-referencing internal wikis...",
    "[Investigator] Found context: 'Zenith Labs Acquisition' (Source: Slack)",
    "[Strategist] Calculating Cost of Inaction...",
    "[Strategist] Searching transformation backlog for solutions...",
    "[Strategist] Match found in transformation backlog",
    "[Ghostwriter] Drafting executive summary...",
];

pub const NOTHING_NEW: &str = "No new signals detected. You're all caught up.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No catalog yet.
    Idle,
    /// A preview (or the previously revealed set) is visible; prompt timer running.
    Partial,
    /// Prompt fired: more signals are known to exist.
    PromptArmed,
    /// A scan or audit run is in progress.
    Revealing,
    /// Everything known is visible.
    Full,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevealState {
    pub visible_ids: HashSet<String>,
    pub has_scanned_once: bool,
    pub prompt_armed: bool,
    pub fresh_ids: HashSet<String>,
    pub fresh_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Pacing started; the reveal completes when the script ends.
    Started,
    /// Nothing hidden; a transient notice was shown.
    NothingNew,
    /// A scan or audit run is already active.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Pacing { cursor: usize },
    Ingest,
}

pub struct RevealMachine {
    config: RevealConfig,
    store: SignalStore,
    state: RevealState,
    phase: Phase,
    trace: LogTrace,
    notice: Option<String>,
    activity: Option<Activity>,
    /// Phase to fall back to if the active audit run fails.
    resume: Phase,
    session: Box<dyn SessionStorage>,
    timer_tx: UnboundedSender<TimerEvent>,
    prompt_timer: TimerSlot,
    pacing_timer: TimerSlot,
    fresh_timer: TimerSlot,
    notice_timer: TimerSlot,
}

impl RevealMachine {
    /// Rebuild the machine from whatever the session holds.
    pub fn restore(
        config: RevealConfig,
        session: Box<dyn SessionStorage>,
        timer_tx: UnboundedSender<TimerEvent>,
        now: DateTime<Utc>,
    ) -> Self {
        let snapshot = SessionSnapshot::load(session.as_ref());
        let store = SignalStore::from_signals(snapshot.signals);

        let visible: Vec<String> = match snapshot.visible_ids {
            Some(ids) => ids,
            None => store
                .all_ids()
                .into_iter()
                .take(snapshot.visible_count)
                .collect(),
        };

        let mut machine = Self {
            trace: LogTrace::new(config.trace_capacity),
            config,
            state: RevealState {
                visible_ids: visible.into_iter().collect(),
                has_scanned_once: snapshot.has_scanned,
                prompt_armed: snapshot.prompt_armed,
                fresh_ids: snapshot.fresh_ids.into_iter().collect(),
                fresh_until: snapshot.fresh_until,
            },
            store,
            phase: Phase::Idle,
            notice: None,
            activity: None,
            resume: Phase::Idle,
            session,
            timer_tx,
            prompt_timer: TimerSlot::new(TimerKind::Prompt),
            pacing_timer: TimerSlot::new(TimerKind::PacingTick),
            fresh_timer: TimerSlot::new(TimerKind::FreshExpiry),
            notice_timer: TimerSlot::new(TimerKind::NoticeExpiry),
        };
        machine.prune();

        if machine.store.is_empty() {
            machine.phase = Phase::Idle;
        } else if machine.state.has_scanned_once {
            machine.phase = Phase::Full;
        } else {
            machine.enter_preview();
        }
        machine.resume_freshness(now);
        machine.checkpoint();

        info!(
            phase = ?machine.phase,
            signals = machine.store.count(),
            visible = machine.state.visible_ids.len(),
            "Reveal state restored"
        );
        machine
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &RevealState {
        &self.state
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    pub fn trace(&self) -> &LogTrace {
        &self.trace
    }

    /// Live trace, written by the dispatcher of an active audit run.
    pub fn trace_mut(&mut self) -> &mut LogTrace {
        &mut self.trace
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.activity.is_some()
    }

    pub fn visible_count(&self) -> usize {
        self.state.visible_ids.len()
    }

    pub fn unseen_count(&self) -> usize {
        self.store.count() - self.visible_count()
    }

    /// Visible signals in store order.
    pub fn visible_signals(&self) -> impl Iterator<Item = &Signal> {
        self.store
            .iter()
            .filter(|s| self.state.visible_ids.contains(&s.signal_id))
    }

    /// A signal is fresh only inside its window, measured against the
    /// persisted deadline rather than a timer.
    pub fn is_fresh(&self, signal_id: &str, now: DateTime<Utc>) -> bool {
        self.state.fresh_until.is_some_and(|until| now < until)
            && self.state.fresh_ids.contains(signal_id)
    }

    pub fn view(&self, now: DateTime<Utc>) -> DashboardView {
        DashboardView {
            phase: self.phase,
            rows: self
                .visible_signals()
                .map(|s| SignalRow {
                    signal_id: s.signal_id.clone(),
                    title: s.title().unwrap_or("(untitled)").to_string(),
                    severity: s.severity().map(str::to_string),
                    fresh: self.is_fresh(&s.signal_id, now),
                })
                .collect(),
            hidden: self.unseen_count(),
            trace: self.trace.lines().map(str::to_string).collect(),
            notice: self.notice.clone(),
            prompt: self.phase == Phase::PromptArmed,
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Replace the catalog (session start or refresh).
    pub fn load_catalog(&mut self, signals: Vec<Signal>) -> bool {
        if self.is_busy() {
            warn!("Catalog load ignored while a scan is active");
            return false;
        }

        self.store.load_snapshot(signals);
        self.prune();

        if self.store.is_empty() {
            self.prompt_timer.cancel();
            self.phase = Phase::Idle;
        } else if !self.state.has_scanned_once {
            self.enter_preview();
        } else if self.unseen_count() > 0 {
            self.wait_for_scan();
        } else {
            self.prompt_timer.cancel();
            self.phase = Phase::Full;
        }

        self.checkpoint();
        info!(
            phase = ?self.phase,
            signals = self.store.count(),
            hidden = self.unseen_count(),
            "Catalog loaded"
        );
        true
    }

    /// User asked to scan for signals.
    pub fn trigger_scan(&mut self) -> ScanOutcome {
        if self.is_busy() {
            return ScanOutcome::Busy;
        }

        if self.unseen_count() == 0 {
            debug!(phase = ?self.phase, "Scan with nothing hidden");
            self.show_notice(NOTHING_NEW);
            return ScanOutcome::NothingNew;
        }

        self.prompt_timer.cancel();
        self.resume = self.phase;
        self.phase = Phase::Revealing;
        self.activity = Some(Activity::Pacing { cursor: 0 });
        self.trace.clear();
        self.pacing_timer
            .arm_every(self.config.pacing_interval, &self.timer_tx);

        info!(hidden = self.unseen_count(), "Scan started");
        ScanOutcome::Started
    }

    /// Start a network audit run. Returns the working copy the run merges
    /// into, or `None` if something is already running.
    pub fn begin_ingest(&mut self) -> Option<SignalStore> {
        if self.is_busy() {
            return None;
        }

        self.prompt_timer.cancel();
        self.resume = self.phase;
        self.phase = Phase::Revealing;
        self.activity = Some(Activity::Ingest);
        self.trace.clear();
        Some(self.store.clone())
    }

    /// Commit a successful run and reveal everything it produced.
    pub fn complete_ingest(&mut self, report: IngestReport, now: DateTime<Utc>) {
        if self.activity != Some(Activity::Ingest) {
            warn!("Dropping audit result with no run in progress");
            return;
        }

        self.store = report.store;
        self.prune();
        self.finish_reveal(&report.arrived, now);
    }

    /// Abandon a failed run: previous phase, store untouched, error in the trace.
    pub fn fail_ingest(&mut self, err: &IngestError) {
        if self.activity != Some(Activity::Ingest) {
            return;
        }

        self.activity = None;
        self.trace.push(format!("Error: {err}"));
        self.phase = self.resume;
        if self.phase == Phase::Partial {
            // Restarts the full delay, not what was left before the run.
            self.prompt_timer
                .arm_once(self.config.prompt_delay, &self.timer_tx);
        }
        warn!(error = %err, phase = ?self.phase, "Audit run failed, state rolled back");
    }

    /// Feed a timer message back in. Returns whether anything visible changed.
    pub fn on_timer(&mut self, event: TimerEvent, now: DateTime<Utc>) -> bool {
        match event.kind {
            TimerKind::Prompt => {
                if !self.prompt_timer.accepts(&event) {
                    return false;
                }
                self.prompt_timer.consume();
                if self.phase != Phase::Partial {
                    return false;
                }
                self.phase = Phase::PromptArmed;
                self.state.prompt_armed = true;
                self.checkpoint();
                info!(hidden = self.unseen_count(), "New signals prompt armed");
                true
            }
            TimerKind::PacingTick => {
                if !self.pacing_timer.accepts(&event) {
                    return false;
                }
                let Some(Activity::Pacing { cursor }) = self.activity else {
                    return false;
                };
                match SCAN_SCRIPT.get(cursor) {
                    Some(line) => {
                        self.trace.push(*line);
                        self.activity = Some(Activity::Pacing { cursor: cursor + 1 });
                    }
                    None => {
                        self.pacing_timer.cancel();
                        self.finish_reveal(&[], now);
                    }
                }
                true
            }
            TimerKind::FreshExpiry => {
                if !self.fresh_timer.accepts(&event) {
                    return false;
                }
                self.fresh_timer.consume();
                self.clear_freshness();
                self.checkpoint();
                debug!("Freshness window closed");
                true
            }
            TimerKind::NoticeExpiry => {
                if !self.notice_timer.accepts(&event) {
                    return false;
                }
                self.notice_timer.consume();
                self.notice = None;
                true
            }
        }
    }

    /// Forget the session: timers, storage and in-memory state.
    pub fn sign_out(&mut self) {
        self.cancel_timers();
        if let Err(e) = SessionSnapshot::clear(self.session.as_mut()) {
            warn!(error = %e, "Failed to clear session");
        }
        self.store = SignalStore::new();
        self.state = RevealState::default();
        self.phase = Phase::Idle;
        self.trace.clear();
        self.notice = None;
        self.activity = None;
        self.resume = Phase::Idle;
        info!("Signed out, session cleared");
    }

    /// Tear down: every timer is cancelled and the session handed back.
    pub fn teardown(mut self) -> Box<dyn SessionStorage> {
        self.cancel_timers();
        self.session
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Show the first K signals and start the prompt countdown.
    fn enter_preview(&mut self) {
        self.state.visible_ids = self
            .store
            .all_ids()
            .into_iter()
            .take(self.config.preview_size)
            .collect();
        self.wait_for_scan();
    }

    /// Partial with the prompt timer running, or PromptArmed if it already fired.
    fn wait_for_scan(&mut self) {
        if self.state.prompt_armed {
            self.prompt_timer.cancel();
            self.phase = Phase::PromptArmed;
        } else {
            self.phase = Phase::Partial;
            self.prompt_timer
                .arm_once(self.config.prompt_delay, &self.timer_tx);
        }
    }

    /// Reveal the whole store. Fresh: everything this reveal exposed (the
    /// whole catalog on the first scan) plus what the run delivered.
    fn finish_reveal(&mut self, arrived: &[String], now: DateTime<Utc>) {
        let all: HashSet<String> = self.store.all_ids().into_iter().collect();
        let revealed: HashSet<String> = if self.state.has_scanned_once {
            all.iter()
                .filter(|id| !self.state.visible_ids.contains(*id))
                .cloned()
                .chain(arrived.iter().filter(|id| all.contains(*id)).cloned())
                .collect()
        } else {
            all.clone()
        };

        self.state.visible_ids = all;
        self.state.has_scanned_once = true;
        self.state.prompt_armed = false;
        self.phase = Phase::Full;
        self.activity = None;
        self.prompt_timer.cancel();

        if !revealed.is_empty() {
            if !self.is_window_open(now) {
                self.state.fresh_ids.clear();
            }
            self.state.fresh_ids.extend(revealed.iter().cloned());
            self.start_fresh_window(now);
        }

        self.checkpoint();
        info!(
            revealed = revealed.len(),
            visible = self.visible_count(),
            "Reveal complete"
        );
    }

    fn start_fresh_window(&mut self, now: DateTime<Utc>) {
        let ttl = self.config.fresh_ttl;
        self.state.fresh_until = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl));
        self.fresh_timer.arm_once(ttl, &self.timer_tx);
    }

    /// Re-arm the expiry timer for whatever is left of a persisted window.
    fn resume_freshness(&mut self, now: DateTime<Utc>) {
        match self.state.fresh_until {
            Some(until) if until > now => {
                if let Ok(remaining) = (until - now).to_std() {
                    self.fresh_timer.arm_once(remaining, &self.timer_tx);
                }
            }
            Some(_) => self.clear_freshness(),
            None => self.state.fresh_ids.clear(),
        }
    }

    fn is_window_open(&self, now: DateTime<Utc>) -> bool {
        self.state.fresh_until.is_some_and(|until| now < until)
    }

    fn clear_freshness(&mut self) {
        self.fresh_timer.cancel();
        self.state.fresh_ids.clear();
        self.state.fresh_until = None;
    }

    fn show_notice(&mut self, message: &str) {
        self.notice = Some(message.to_string());
        self.notice_timer
            .arm_once(self.config.notice_ttl, &self.timer_tx);
    }

    /// Keep `visible_ids` and `fresh_ids` within the store.
    fn prune(&mut self) {
        let store = &self.store;
        self.state.visible_ids.retain(|id| store.contains(id));
        self.state.fresh_ids.retain(|id| store.contains(id));
    }

    fn cancel_timers(&mut self) {
        self.prompt_timer.cancel();
        self.pacing_timer.cancel();
        self.fresh_timer.cancel();
        self.notice_timer.cancel();
    }

    fn checkpoint(&mut self) {
        let ordered = |set: &HashSet<String>| -> Vec<String> {
            self.store
                .iter()
                .filter(|s| set.contains(&s.signal_id))
                .map(|s| s.signal_id.clone())
                .collect()
        };
        let snapshot = SessionSnapshot {
            signals: self.store.signals().to_vec(),
            has_scanned: self.state.has_scanned_once,
            visible_ids: Some(ordered(&self.state.visible_ids)),
            visible_count: self.state.visible_ids.len(),
            prompt_armed: self.state.prompt_armed,
            fresh_ids: ordered(&self.state.fresh_ids),
            fresh_until: self.state.fresh_until,
        };

        if let Err(e) = snapshot.save(self.session.as_mut()) {
            warn!(error = %e, "Session checkpoint failed");
        }
    }
}
