//! Error types for the loading controller

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading the splash media
///
/// The media faults (`MediaLoadError`, `WatchdogTimeout`,
/// `ReadinessHoldTimeout`) are recovered inside the controller: they are
/// recorded as the loader's fault and never reach the completion callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The media resource reported a load error
    #[error("Media failed to load: {0}")]
    MediaLoadError(String),

    /// No terminal readiness signal arrived before the watchdog fired
    #[error("Media readiness timed out after {0}ms")]
    WatchdogTimeout(u64),

    /// The progress driver stopped waiting for readiness
    #[error("Gave up waiting for media readiness after {0}ms")]
    ReadinessHoldTimeout(u64),

    /// Playback could not be started (autoplay blocked, decoder missing, ...)
    #[error("Playback failed: {0}")]
    PlaybackError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The controller could not be started
    #[error("Controller initialization failed: {0}")]
    InitializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is one of the recoverable media faults.
    pub fn is_media_fault(&self) -> bool {
        matches!(
            self,
            Error::MediaLoadError(_) | Error::WatchdogTimeout(_) | Error::ReadinessHoldTimeout(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
