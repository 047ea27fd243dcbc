//! Completion gate: progress at 100, then a minimum display time, then done.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GatePhase {
    #[default]
    WaitingOnProgress,
    WaitingOnDisplayTime,
    Complete,
}

#[derive(Debug, Default)]
pub struct CompletionGate {
    phase: GatePhase,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == GatePhase::Complete
    }

    /// Progress hit 100. True if this started the display wait.
    pub fn progress_complete(&mut self) -> bool {
        if self.phase != GatePhase::WaitingOnProgress {
            return false;
        }
        self.phase = GatePhase::WaitingOnDisplayTime;
        true
    }

    /// The display delay elapsed. True exactly once, on entering `Complete`.
    pub fn display_elapsed(&mut self) -> bool {
        if self.phase != GatePhase::WaitingOnDisplayTime {
            return false;
        }
        self.phase = GatePhase::Complete;
        true
    }
}
