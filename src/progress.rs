//! Progress driver: the percentage shown on the splash screen.
//!
//! Progress is paced by the clock, not by the media, so the bar keeps moving
//! even when the media is slow. It walks the configured checkpoints, holds at
//! the last one until readiness is resolved, then jumps to 100.

use log::debug;

/// Where the driver is in its sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    /// Not started yet
    Idle,
    /// Walking checkpoints; `next` indexes the next one to show
    Stepping { next: usize },
    /// Past the last checkpoint, waiting on readiness
    Holding,
    /// Reached 100
    Finished,
}

/// Result of starting or stepping the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Moved to this checkpoint; the next step is due one interval later
    Advanced(u8),
    /// All checkpoints shown; the readiness hold starts now
    EnterHold,
    /// Nothing to do in the current stage
    Idle,
}

#[derive(Debug)]
pub struct ProgressDriver {
    checkpoints: Vec<u8>,
    percent: u8,
    stage: ProgressStage,
}

impl ProgressDriver {
    pub fn new(checkpoints: Vec<u8>) -> Self {
        ProgressDriver {
            checkpoints,
            percent: 0,
            stage: ProgressStage::Idle,
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn stage(&self) -> ProgressStage {
        self.stage
    }

    pub fn start(&mut self) -> StepOutcome {
        if self.stage != ProgressStage::Idle {
            return StepOutcome::Idle;
        }
        self.stage = ProgressStage::Stepping { next: 0 };
        self.step()
    }

    /// Called when the step interval elapses.
    pub fn step(&mut self) -> StepOutcome {
        let ProgressStage::Stepping { next } = self.stage else {
            return StepOutcome::Idle;
        };
        match self.checkpoints.get(next).copied() {
            Some(checkpoint) => {
                self.raise(checkpoint);
                self.stage = ProgressStage::Stepping { next: next + 1 };
                debug!("progress checkpoint {}%", self.percent);
                StepOutcome::Advanced(self.percent)
            }
            None => {
                self.stage = ProgressStage::Holding;
                debug!("progress holding at {}% for media readiness", self.percent);
                StepOutcome::EnterHold
            }
        }
    }

    /// Jump to 100 once the hold is released. Returns `None` unless holding.
    pub fn finish(&mut self) -> Option<u8> {
        if self.stage != ProgressStage::Holding {
            return None;
        }
        self.raise(100);
        self.stage = ProgressStage::Finished;
        Some(self.percent)
    }

    fn raise(&mut self, to: u8) {
        self.percent = self.percent.max(to.min(100));
    }
}
