//! Media handle abstraction and lifecycle signals
//!
//! The controller never owns the media resource. It asks it to load, asks it
//! to play, polls its ready state, and subscribes to its lifecycle signals for
//! as long as it is active. Hosts implement [`MediaHandle`] over whatever the
//! real resource is; [`ScriptedMedia`] is an in-memory implementation driven
//! by tests and the simulator.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::{Error, Result};

/// Lifecycle notification emitted by a media resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSignal {
    /// The resource started fetching
    LoadStart,
    /// Duration and dimensions are known
    MetadataReady,
    /// The current frame is available
    DataReady,
    /// Enough data to start playing
    CanPlay,
    /// Enough data to play through without stalling
    CanPlayFully,
    /// The resource failed to load
    LoadError(String),
}

impl MediaSignal {
    /// Whether this signal reports some degree of successful loading.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            MediaSignal::MetadataReady
                | MediaSignal::DataReady
                | MediaSignal::CanPlay
                | MediaSignal::CanPlayFully
        )
    }

    /// Stable kebab-case name, also accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            MediaSignal::LoadStart => "load-start",
            MediaSignal::MetadataReady => "metadata-ready",
            MediaSignal::DataReady => "data-ready",
            MediaSignal::CanPlay => "can-play",
            MediaSignal::CanPlayFully => "can-play-fully",
            MediaSignal::LoadError(_) => "load-error",
        }
    }

    /// Ready state implied by receiving this signal, if any.
    pub fn implied_ready_state(&self) -> Option<ReadyState> {
        match self {
            MediaSignal::MetadataReady => Some(ReadyState::HaveMetadata),
            MediaSignal::DataReady => Some(ReadyState::HaveCurrentData),
            MediaSignal::CanPlay => Some(ReadyState::HaveFutureData),
            MediaSignal::CanPlayFully => Some(ReadyState::HaveEnoughData),
            MediaSignal::LoadStart | MediaSignal::LoadError(_) => None,
        }
    }
}

impl fmt::Display for MediaSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSignal::LoadError(detail) => write!(f, "load-error: {}", detail),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for MediaSignal {
    type Err = Error;

    /// Parses `load-start`, `metadata-ready`, `data-ready`, `can-play`,
    /// `can-play-fully`, `load-error` or `load-error:<detail>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(detail) = s.strip_prefix("load-error:") {
            return Ok(MediaSignal::LoadError(detail.trim().to_string()));
        }
        match s {
            "load-start" => Ok(MediaSignal::LoadStart),
            "metadata-ready" => Ok(MediaSignal::MetadataReady),
            "data-ready" => Ok(MediaSignal::DataReady),
            "can-play" => Ok(MediaSignal::CanPlay),
            "can-play-fully" => Ok(MediaSignal::CanPlayFully),
            "load-error" => Ok(MediaSignal::LoadError("unspecified".to_string())),
            other => Err(Error::Other(format!("unknown media signal '{}'", other))),
        }
    }
}

/// How much of the resource is buffered, ordered from nothing to everything
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl FromStr for ReadyState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "nothing" => Ok(ReadyState::HaveNothing),
            "metadata" => Ok(ReadyState::HaveMetadata),
            "current-data" => Ok(ReadyState::HaveCurrentData),
            "future-data" => Ok(ReadyState::HaveFutureData),
            "enough-data" => Ok(ReadyState::HaveEnoughData),
            other => Err(Error::Other(format!("unknown ready state '{}'", other))),
        }
    }
}

/// Externally owned, playable media resource
pub trait MediaHandle: Send + Sync {
    /// URL or other reference describing the resource
    fn source(&self) -> &str;

    /// Ask the resource to (re)start loading.
    fn load(&self);

    /// Try to start playback. Failures are expected (autoplay policies) and
    /// never change readiness.
    fn play(&self) -> Result<()>;

    /// Current buffered state, polled by the watchdog.
    fn ready_state(&self) -> ReadyState;

    /// Subscribe to lifecycle signals. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<MediaSignal>;
}

#[derive(Debug, Default)]
struct ScriptedState {
    ready_state: ReadyState,
    subscribers: Vec<mpsc::UnboundedSender<MediaSignal>>,
    autoplay_blocked: bool,
    playing: bool,
    load_calls: usize,
    play_attempts: usize,
}

/// In-memory media resource whose signals are emitted by the caller
#[derive(Debug)]
pub struct ScriptedMedia {
    source: String,
    state: Mutex<ScriptedState>,
}

impl ScriptedMedia {
    pub fn new(source: impl Into<String>) -> Self {
        ScriptedMedia {
            source: source.into(),
            state: Mutex::new(ScriptedState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver `signal` to every live subscriber and return how many got it.
    ///
    /// Success signals also raise the reported ready state.
    pub fn emit(&self, signal: MediaSignal) -> usize {
        let mut st = self.state();
        if let Some(implied) = signal.implied_ready_state() {
            st.ready_state = st.ready_state.max(implied);
        }
        st.subscribers.retain(|tx| tx.send(signal.clone()).is_ok());
        st.subscribers.len()
    }

    /// Change the polled ready state without emitting anything, as when the
    /// resource buffered before anyone subscribed.
    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state().ready_state = ready_state;
    }

    /// Make subsequent `play` calls fail the way a blocked autoplay does.
    pub fn block_autoplay(&self, blocked: bool) {
        self.state().autoplay_blocked = blocked;
    }

    /// Subscribers whose receivers are still alive
    pub fn subscriber_count(&self) -> usize {
        let mut st = self.state();
        st.subscribers.retain(|tx| !tx.is_closed());
        st.subscribers.len()
    }

    pub fn load_calls(&self) -> usize {
        self.state().load_calls
    }

    pub fn play_attempts(&self) -> usize {
        self.state().play_attempts
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }
}

impl MediaHandle for ScriptedMedia {
    fn source(&self) -> &str {
        &self.source
    }

    fn load(&self) {
        let mut st = self.state();
        st.load_calls += 1;
        st.playing = false;
    }

    fn play(&self) -> Result<()> {
        let mut st = self.state();
        st.play_attempts += 1;
        if st.autoplay_blocked {
            return Err(Error::PlaybackError("autoplay blocked".to_string()));
        }
        if st.ready_state == ReadyState::HaveNothing {
            return Err(Error::PlaybackError("no media data".to_string()));
        }
        st.playing = true;
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.state().ready_state
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<MediaSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().subscribers.push(tx);
        rx
    }
}
