//! Named, cancellable deadlines driving the loader.
//!
//! Every delay the loader waits on lives here, so teardown is a single
//! `cancel_all` rather than a handful of scattered timer handles.

use tokio::time::Instant;

/// The timers a loader can have armed. Declaration order breaks ties between
/// equal deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    Watchdog,
    ReadinessHold,
    ProgressStep,
    DisplayHold,
    PlaybackKick,
}

#[derive(Debug, Default)]
pub struct Timeline {
    armed: Vec<(TimerKind, Instant)>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `at`, replacing any earlier deadline for it.
    pub fn arm(&mut self, kind: TimerKind, at: Instant) {
        self.disarm(kind);
        self.armed.push((kind, at));
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        self.armed.retain(|(k, _)| *k != kind);
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.iter().any(|(k, _)| *k == kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.armed.iter().find(|(k, _)| *k == kind).map(|(_, at)| *at)
    }

    /// Earliest armed deadline.
    pub fn next_due(&self) -> Option<(TimerKind, Instant)> {
        self.armed.iter().copied().min_by_key(|(kind, at)| (*at, *kind))
    }

    /// Disarm and return the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerKind> {
        let (kind, at) = self.next_due()?;
        if at > now {
            return None;
        }
        self.disarm(kind);
        Some(kind)
    }

    pub fn cancel_all(&mut self) {
        self.armed.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
