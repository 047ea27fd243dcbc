//! readygate
//!
//! Media readiness and progress sequencing for splash/loading screens. A
//! loader shows a clock-paced progress percentage, decides whether the
//! background video is usable from the media's lifecycle signals, and tells
//! the host exactly once that loading is complete.
//!
//! # Pieces
//!
//! - **Progress driver** ([`progress`]): checkpoints on a fixed schedule, a
//!   hold until readiness is known, then 100.
//! - **Readiness aggregator** ([`readiness`]): first terminal signal wins, a
//!   watchdog decides if nothing arrives.
//! - **Completion gate** ([`gate`]): 100% plus a minimum display time.
//! - **Controller** ([`controller`]): runs the above on tokio against a
//!   [`MediaHandle`](media::MediaHandle).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use readygate::{LoaderConfig, MediaReadinessController};
//! use readygate::media::{MediaSignal, ScriptedMedia};
//!
//! # async fn run() -> readygate::Result<()> {
//! let media = Arc::new(ScriptedMedia::new("/videos/intro.mp4"));
//! let handle = MediaReadinessController::activate(
//!     media.clone(),
//!     LoaderConfig::default(),
//!     || println!("show the landing page"),
//! )?;
//!
//! media.emit(MediaSignal::CanPlay);
//! let outcome = handle.join().await?;
//! println!("media was {:?}", outcome.readiness);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod controller;
pub mod gate;
pub mod machine;
pub mod media;
pub mod progress;
pub mod readiness;
pub mod timeline;

pub use controller::{LoadOutcome, LoaderHandle, MediaReadinessController};
pub use gate::GatePhase;
pub use machine::{LoaderStatus, PlaybackStatus};
pub use readiness::Readiness;

/// Timing policy for a loader
///
/// All durations are in milliseconds. The defaults reproduce the production
/// splash screen: checkpoints every 400ms, a 3s watchdog and 4s of display
/// time once progress reaches 100.
///
/// # Examples
///
/// ```
/// let cfg = readygate::LoaderConfig::default();
/// assert_eq!(cfg.checkpoints, vec![20, 40, 60, 80]);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Percentages shown before the readiness hold, strictly increasing, below 100
    pub checkpoints: Vec<u8>,
    /// Delay between checkpoints, and between the last one and the hold
    pub step_interval_ms: u64,
    /// How long the aggregator waits for a terminal signal
    pub watchdog_timeout_ms: u64,
    /// How long the progress driver holds before giving up on readiness
    pub max_readiness_wait_ms: u64,
    /// Minimum time to keep the finished screen up after reaching 100
    pub display_delay_ms: u64,
    /// Delay between readiness and the autoplay attempt
    pub playback_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            checkpoints: vec![20, 40, 60, 80],
            step_interval_ms: 400,
            watchdog_timeout_ms: 3000,
            max_readiness_wait_ms: 5000,
            display_delay_ms: 4000,
            playback_delay_ms: 200,
        }
    }
}

impl LoaderConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: LoaderConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_interval_ms == 0 {
            return Err(Error::ConfigError("step_interval_ms must be positive".into()));
        }
        let mut prev = 0u8;
        for &cp in &self.checkpoints {
            if cp == 0 || cp >= 100 {
                return Err(Error::ConfigError(format!(
                    "checkpoint {} is outside 1..=99",
                    cp
                )));
            }
            if cp <= prev {
                return Err(Error::ConfigError(format!(
                    "checkpoints must be strictly increasing ({} after {})",
                    cp, prev
                )));
            }
            prev = cp;
        }
        Ok(())
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn max_readiness_wait(&self) -> Duration {
        Duration::from_millis(self.max_readiness_wait_ms)
    }

    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.display_delay_ms)
    }

    pub fn playback_delay(&self) -> Duration {
        Duration::from_millis(self.playback_delay_ms)
    }

    /// When the readiness hold starts, measured from activation
    pub fn hold_start(&self) -> Duration {
        self.step_interval() * self.checkpoints.len() as u32
    }

    /// Latest possible completion time, measured from activation, when no
    /// media signal ever arrives.
    pub fn completion_bound(&self) -> Duration {
        let hold_start = self.hold_start();
        let resolved = self
            .watchdog_timeout()
            .min(hold_start + self.max_readiness_wait());
        hold_start.max(resolved) + self.display_delay()
    }
}
