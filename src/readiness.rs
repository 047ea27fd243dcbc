//! Readiness aggregation: many overlapping media signals in, one verdict out.

use log::{debug, info, warn};
use serde::Serialize;

use crate::media::{MediaSignal, ReadyState};
use crate::Error;

/// Terminal classification of the splash media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Readiness {
    #[default]
    Pending,
    Ready,
    Errored,
}

impl Readiness {
    pub fn is_resolved(self) -> bool {
        self != Readiness::Pending
    }
}

/// First-signal-wins reducer over media lifecycle signals.
///
/// Leaves `Pending` at most once. Every input after the verdict is ignored.
#[derive(Debug, Default)]
pub struct ReadinessAggregator {
    readiness: Readiness,
    partial_progress: bool,
    fault: Option<Error>,
}

impl ReadinessAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Why the media resolved to `Errored`, if it did
    pub fn fault(&self) -> Option<&Error> {
        self.fault.as_ref()
    }

    pub fn partial_progress(&self) -> bool {
        self.partial_progress
    }

    /// Feed one signal. Returns the new readiness if this signal resolved it.
    pub fn observe(&mut self, signal: &MediaSignal) -> Option<Readiness> {
        if signal.is_success() {
            self.partial_progress = true;
        }
        if self.readiness.is_resolved() {
            debug!("ignoring {} after readiness resolved", signal.name());
            return None;
        }
        match signal {
            MediaSignal::LoadStart => {
                debug!("media load started");
                None
            }
            MediaSignal::LoadError(detail) => {
                warn!("media load error: {}", detail);
                self.resolve(Readiness::Errored, Some(Error::MediaLoadError(detail.clone())))
            }
            success => {
                info!("media ready on {}", success.name());
                self.resolve(Readiness::Ready, None)
            }
        }
    }

    /// Watchdog expiry. Partial progress (a success signal we saw, or a
    /// polled ready state of at least `HaveMetadata`) counts as ready.
    pub fn watchdog_expired(&mut self, polled: ReadyState, timeout_ms: u64) -> Option<Readiness> {
        if self.readiness.is_resolved() {
            return None;
        }
        if self.partial_progress || polled >= ReadyState::HaveMetadata {
            self.partial_progress = true;
            info!("watchdog fired after {}ms with partial progress, treating media as ready", timeout_ms);
            self.resolve(Readiness::Ready, None)
        } else {
            warn!("watchdog fired after {}ms with no media progress", timeout_ms);
            self.resolve(Readiness::Errored, Some(Error::WatchdogTimeout(timeout_ms)))
        }
    }

    /// Resolve a still-pending verdict as `Errored` with the given fault.
    pub fn force_errored(&mut self, fault: Error) -> Option<Readiness> {
        if self.readiness.is_resolved() {
            return None;
        }
        warn!("forcing media readiness to errored: {}", fault);
        self.resolve(Readiness::Errored, Some(fault))
    }

    fn resolve(&mut self, readiness: Readiness, fault: Option<Error>) -> Option<Readiness> {
        self.readiness = readiness;
        self.fault = fault;
        Some(readiness)
    }
}
