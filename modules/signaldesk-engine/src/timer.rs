//! Cancellable scheduled tasks.
//!
//! A timer never touches dashboard state. It only posts a [`TimerEvent`]
//! back to the event loop, tagged with the generation it was armed under, so
//! a message from a timer that was cancelled after firing is recognisably
//! stale. Dropping a task aborts it.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Shortest period a repeating task will tick at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delayed "new signals available" prompt.
    Prompt,
    /// One line of the scan script.
    PacingTick,
    /// End of the freshness window.
    FreshExpiry,
    /// End of the transient notice.
    NoticeExpiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    pub generation: u64,
}

pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Fire `event` once after `delay`.
    pub fn once(delay: Duration, tx: UnboundedSender<TimerEvent>, event: TimerEvent) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
        Self { handle }
    }

    /// Fire `event` every `period`, first after one full period. A zero
    /// period is raised to [`MIN_PERIOD`].
    pub fn every(period: Duration, tx: UnboundedSender<TimerEvent>, event: TimerEvent) -> Self {
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn cancel(self) {
        // Drop aborts.
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One named timer owned by the reveal machine: at most one task armed at a
/// time, re-arming replaces it.
pub struct TimerSlot {
    kind: TimerKind,
    task: Option<ScheduledTask>,
    generation: u64,
}

impl TimerSlot {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            task: None,
            generation: 0,
        }
    }

    pub fn arm_once(&mut self, delay: Duration, tx: &UnboundedSender<TimerEvent>) {
        let event = self.next_event();
        self.task = Some(ScheduledTask::once(delay, tx.clone(), event));
    }

    pub fn arm_every(&mut self, period: Duration, tx: &UnboundedSender<TimerEvent>) {
        let event = self.next_event();
        self.task = Some(ScheduledTask::every(period, tx.clone(), event));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        // Invalidate anything already queued by the cancelled task.
        self.generation += 1;
    }

    /// True if `event` came from the task currently armed in this slot.
    pub fn accepts(&self, event: &TimerEvent) -> bool {
        event.kind == self.kind && self.task.is_some() && event.generation == self.generation
    }

    /// A one-shot slot is spent once its event has been accepted.
    pub fn consume(&mut self) {
        self.task = None;
    }

    fn next_event(&mut self) -> TimerEvent {
        self.generation += 1;
        TimerEvent {
            kind: self.kind,
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Prompt);
        slot.arm_once(Duration::from_secs(15), &tx);

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert!(rx.try_recv().is_err());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, TimerKind::Prompt);
        assert!(slot.accepts(&event));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Prompt);
        slot.arm_once(Duration::from_secs(1), &tx);
        slot.cancel();
        drop(tx);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_event_from_replaced_task_is_stale() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::NoticeExpiry);
        slot.arm_once(Duration::from_secs(1), &tx);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let stale = rx.recv().await.unwrap();

        slot.arm_once(Duration::from_secs(1), &tx);
        assert!(!slot.accepts(&stale));

        let fresh = rx.recv().await.unwrap();
        assert!(slot.accepts(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn every_ticks_on_cadence_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::PacingTick);
        slot.arm_every(Duration::from_millis(300), &tx);

        let start = Instant::now();
        for n in 1..=3u32 {
            let event = rx.recv().await.unwrap();
            assert!(slot.accepts(&event));
            assert_eq!(start.elapsed(), Duration::from_millis(300) * n);
        }

        slot.cancel();
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_ticks_at_the_minimum() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::PacingTick);
        slot.arm_every(Duration::ZERO, &tx);

        let start = Instant::now();
        let event = rx.recv().await.unwrap();

        assert!(slot.accepts(&event));
        assert_eq!(start.elapsed(), MIN_PERIOD);
    }
}
