//! The loader state machine.
//!
//! `LoaderMachine` composes the progress driver, the readiness aggregator and
//! the completion gate over one [`Timeline`]. It does no I/O and never reads
//! the clock: callers pass `now` in and carry out the returned [`Effect`]s,
//! which keeps every transition deterministic under test.

use log::info;
use serde::Serialize;
use tokio::time::Instant;

use crate::gate::{CompletionGate, GatePhase};
use crate::media::{MediaSignal, ReadyState};
use crate::progress::{ProgressDriver, ProgressStage, StepOutcome};
use crate::readiness::{Readiness, ReadinessAggregator};
use crate::timeline::{TimerKind, Timeline};
use crate::{Error, LoaderConfig, Result};

/// Something the owner of the machine has to do or publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Progress moved to this percentage
    Progress(u8),
    /// Readiness left `Pending`
    Readiness(Readiness),
    /// Call `play()` on the media and report back with `playback_result`
    AttemptPlayback,
    /// Invoke the completion callback. Emitted at most once.
    Complete,
}

/// Best-effort playback outcome, independent of readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    /// Playback was refused; hosts usually show a "click to play" prompt
    Blocked,
}

/// Snapshot of the loader for rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoaderStatus {
    pub progress: u8,
    pub readiness: Readiness,
    pub phase: GatePhase,
    pub playback: PlaybackStatus,
    pub active: bool,
    /// Display form of the fault behind an `Errored` readiness
    pub fault: Option<String>,
}

impl LoaderStatus {
    /// Whether the host should show the video rather than the static fallback
    pub fn show_media(&self) -> bool {
        self.readiness == Readiness::Ready
    }
}

#[derive(Debug)]
pub struct LoaderMachine {
    config: LoaderConfig,
    progress: ProgressDriver,
    aggregator: ReadinessAggregator,
    gate: CompletionGate,
    timeline: Timeline,
    playback: PlaybackStatus,
    started: bool,
    active: bool,
}

impl LoaderMachine {
    pub fn new(config: LoaderConfig) -> Self {
        LoaderMachine {
            progress: ProgressDriver::new(config.checkpoints.clone()),
            config,
            aggregator: ReadinessAggregator::new(),
            gate: CompletionGate::new(),
            timeline: Timeline::new(),
            playback: PlaybackStatus::Idle,
            started: false,
            active: true,
        }
    }

    /// Arm the watchdog and show the first checkpoint.
    pub fn start(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.started || !self.active {
            return effects;
        }
        self.started = true;
        self.timeline
            .arm(TimerKind::Watchdog, now + self.config.watchdog_timeout());
        let outcome = self.progress.start();
        self.apply_step(outcome, now, &mut effects);
        effects
    }

    pub fn on_signal(&mut self, signal: &MediaSignal, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.active {
            return effects;
        }
        if let Some(readiness) = self.aggregator.observe(signal) {
            self.on_resolved(readiness, now, &mut effects);
        }
        effects
    }

    /// A click or touch from the viewer: retry playback if the media is ready
    /// but not playing.
    pub fn on_interaction(&mut self) -> Vec<Effect> {
        if self.active
            && self.aggregator.readiness() == Readiness::Ready
            && self.playback != PlaybackStatus::Playing
        {
            vec![Effect::AttemptPlayback]
        } else {
            Vec::new()
        }
    }

    pub fn playback_result(&mut self, result: &Result<()>) {
        if !self.active {
            return;
        }
        self.playback = match result {
            Ok(()) => PlaybackStatus::Playing,
            Err(_) => PlaybackStatus::Blocked,
        };
    }

    /// Earliest armed timer, if any.
    pub fn next_deadline(&self) -> Option<(TimerKind, Instant)> {
        self.timeline.next_due()
    }

    /// Fire every timer due at `now`, in deadline order. `polled` is the
    /// media's current ready state, consulted if the watchdog fires.
    pub fn fire_due(&mut self, now: Instant, polled: ReadyState) -> Vec<Effect> {
        let mut effects = Vec::new();
        while self.active {
            let Some(kind) = self.timeline.pop_due(now) else {
                break;
            };
            self.on_timer(kind, now, polled, &mut effects);
        }
        effects
    }

    /// Stop everything. No effect is produced after this.
    pub fn teardown(&mut self) {
        self.active = false;
        self.timeline.cancel_all();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn progress(&self) -> u8 {
        self.progress.percent()
    }

    pub fn readiness(&self) -> Readiness {
        self.aggregator.readiness()
    }

    pub fn fault(&self) -> Option<&Error> {
        self.aggregator.fault()
    }

    pub fn phase(&self) -> GatePhase {
        self.gate.phase()
    }

    pub fn playback(&self) -> PlaybackStatus {
        self.playback
    }

    pub fn status(&self) -> LoaderStatus {
        LoaderStatus {
            progress: self.progress(),
            readiness: self.readiness(),
            phase: self.phase(),
            playback: self.playback,
            active: self.active,
            fault: self.fault().map(|e| e.to_string()),
        }
    }

    fn on_timer(&mut self, kind: TimerKind, now: Instant, polled: ReadyState, effects: &mut Vec<Effect>) {
        match kind {
            TimerKind::Watchdog => {
                let timeout_ms = self.config.watchdog_timeout_ms;
                if let Some(readiness) = self.aggregator.watchdog_expired(polled, timeout_ms) {
                    self.on_resolved(readiness, now, effects);
                }
            }
            TimerKind::ReadinessHold => {
                let fault = Error::ReadinessHoldTimeout(self.config.max_readiness_wait_ms);
                match self.aggregator.force_errored(fault) {
                    Some(readiness) => self.on_resolved(readiness, now, effects),
                    None => self.release_hold(now, effects),
                }
            }
            TimerKind::ProgressStep => {
                let outcome = self.progress.step();
                self.apply_step(outcome, now, effects);
            }
            TimerKind::DisplayHold => {
                if self.gate.display_elapsed() {
                    info!(
                        "loading complete (media {:?})",
                        self.aggregator.readiness()
                    );
                    self.teardown();
                    effects.push(Effect::Complete);
                }
            }
            TimerKind::PlaybackKick => {
                if self.aggregator.readiness() == Readiness::Ready
                    && self.playback != PlaybackStatus::Playing
                {
                    effects.push(Effect::AttemptPlayback);
                }
            }
        }
    }

    fn apply_step(&mut self, outcome: StepOutcome, now: Instant, effects: &mut Vec<Effect>) {
        match outcome {
            StepOutcome::Advanced(percent) => {
                effects.push(Effect::Progress(percent));
                self.timeline
                    .arm(TimerKind::ProgressStep, now + self.config.step_interval());
            }
            StepOutcome::EnterHold => {
                if self.aggregator.readiness().is_resolved() {
                    self.release_hold(now, effects);
                } else {
                    self.timeline
                        .arm(TimerKind::ReadinessHold, now + self.config.max_readiness_wait());
                }
            }
            StepOutcome::Idle => {}
        }
    }

    fn on_resolved(&mut self, readiness: Readiness, now: Instant, effects: &mut Vec<Effect>) {
        effects.push(Effect::Readiness(readiness));
        self.timeline.disarm(TimerKind::Watchdog);
        if readiness == Readiness::Ready {
            self.timeline
                .arm(TimerKind::PlaybackKick, now + self.config.playback_delay());
        }
        if self.progress.stage() == ProgressStage::Holding {
            self.release_hold(now, effects);
        }
    }

    fn release_hold(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        self.timeline.disarm(TimerKind::ReadinessHold);
        if let Some(percent) = self.progress.finish() {
            effects.push(Effect::Progress(percent));
            if self.gate.progress_complete() {
                self.timeline
                    .arm(TimerKind::DisplayHold, now + self.config.display_delay());
            }
        }
    }
}
