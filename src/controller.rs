//! Async controller: runs a [`LoaderMachine`] against a live media handle.
//!
//! Each activation spawns one tokio task. The task owns the machine and the
//! media subscription and waits on whichever comes first: teardown, a media
//! signal, a viewer interaction or the next timeline deadline. The handle
//! returned to the host reads status, forwards interactions and tears the
//! loader down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::machine::{Effect, LoaderMachine, LoaderStatus};
use crate::media::{MediaHandle, MediaSignal};
use crate::readiness::Readiness;
use crate::{Error, LoaderConfig, Result};

/// How an activation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub readiness: Readiness,
    pub fault: Option<Error>,
    pub progress: u8,
    /// Whether the completion callback ran; false after teardown
    pub completed: bool,
}

/// State shared between the handle and the loader task
struct Shared {
    active: AtomicBool,
    status: watch::Sender<LoaderStatus>,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flip `active` off and publish `last` as the final status. Both happen
    /// under the status lock, so they serialize with [`Shared::publish`].
    /// True only for the caller that actually flipped it.
    fn shut_down(&self, last: impl FnOnce(&mut LoaderStatus)) -> bool {
        let mut flipped = false;
        self.status.send_if_modified(|status| {
            flipped = self
                .active
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if flipped {
                last(status);
            }
            flipped
        });
        flipped
    }

    /// Publish `status` unless the loader has been shut down.
    fn publish(&self, status: LoaderStatus) {
        self.status.send_if_modified(|current| {
            if !self.is_active() {
                return false;
            }
            *current = status;
            true
        });
    }
}

/// What woke the loader task
enum Wakeup {
    Signal(MediaSignal),
    SignalsClosed,
    Interaction,
    Deadline,
}

/// Entry point for starting a loader
pub struct MediaReadinessController;

impl MediaReadinessController {
    /// Start loading `media` under `config`. `on_complete` runs exactly once
    /// when the loader finishes, and never if it is torn down first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate<M, F>(media: Arc<M>, config: LoaderConfig, on_complete: F) -> Result<LoaderHandle>
    where
        M: MediaHandle + ?Sized + 'static,
        F: FnOnce() + Send + 'static,
    {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::InitializationError(e.to_string()))?;

        // subscribe before load so no early signal is missed
        let signals = media.subscribe();
        media.load();
        debug!("loader activated for {}", media.source());

        let mut machine = LoaderMachine::new(config);
        machine.start(Instant::now());

        let (status_tx, status_rx) = watch::channel(machine.status());
        let shared = Arc::new(Shared {
            active: AtomicBool::new(true),
            status: status_tx,
        });
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (interact_tx, interact_rx) = mpsc::unbounded_channel();

        let task = runtime.spawn(drive(
            machine,
            media,
            signals,
            interact_rx,
            cancel_rx,
            shared.clone(),
            on_complete,
        ));

        Ok(LoaderHandle {
            shared,
            status_rx,
            interact_tx,
            cancel_tx: Some(cancel_tx),
            task: Some(task),
        })
    }
}

/// Host-side handle to a running loader. Dropping it tears the loader down.
pub struct LoaderHandle {
    shared: Arc<Shared>,
    status_rx: watch::Receiver<LoaderStatus>,
    interact_tx: mpsc::UnboundedSender<()>,
    cancel_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<LoadOutcome>>,
}

impl LoaderHandle {
    /// Latest published status
    pub fn status(&self) -> LoaderStatus {
        self.status_rx.borrow().clone()
    }

    pub fn progress(&self) -> u8 {
        self.status_rx.borrow().progress
    }

    pub fn readiness(&self) -> Readiness {
        self.status_rx.borrow().readiness
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<LoaderStatus> {
        self.status_rx.clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Report a click or touch from the viewer. Retries playback if the media
    /// is ready but autoplay was refused.
    pub fn interact(&self) {
        if self.is_active() {
            let _ = self.interact_tx.send(());
        }
    }

    /// Stop the loader. Takes effect immediately: no state change and no
    /// completion callback happens afterwards, even for wakeups already
    /// queued. Calling it again, or after completion, does nothing.
    pub fn teardown(&mut self) {
        if self.shared.shut_down(|status| status.active = false) {
            debug!("loader torn down");
        }
        if let Some(cancel) = self.cancel_tx.take() {
            let _ = cancel.send(());
        }
    }

    /// Wait for the loader task to finish, by completion or teardown.
    pub async fn join(mut self) -> Result<LoadOutcome> {
        let task = self
            .task
            .take()
            .ok_or_else(|| Error::Other("loader already joined".to_string()))?;
        task.await
            .map_err(|e| Error::Other(format!("Loader task failed: {}", e)))
    }
}

impl Drop for LoaderHandle {
    fn drop(&mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn drive<M, F>(
    mut machine: LoaderMachine,
    media: Arc<M>,
    mut signals: mpsc::UnboundedReceiver<MediaSignal>,
    mut interactions: mpsc::UnboundedReceiver<()>,
    mut cancel: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    on_complete: F,
) -> LoadOutcome
where
    M: MediaHandle + ?Sized,
    F: FnOnce() + Send,
{
    let mut on_complete = Some(on_complete);
    let mut completed = false;
    let mut signals_open = true;

    while machine.is_active() {
        let deadline = machine.next_deadline().map(|(_, at)| at);
        let wakeup = tokio::select! {
            biased;
            _ = &mut cancel => {
                machine.teardown();
                break;
            }
            signal = signals.recv(), if signals_open => match signal {
                Some(signal) => Wakeup::Signal(signal),
                None => Wakeup::SignalsClosed,
            },
            Some(()) = interactions.recv() => Wakeup::Interaction,
            _ = sleep_until_deadline(deadline) => Wakeup::Deadline,
        };

        // a wakeup queued before teardown must not touch anything
        if !shared.is_active() {
            machine.teardown();
            break;
        }

        let effects = match wakeup {
            Wakeup::Signal(signal) => {
                debug!("media signal: {}", signal);
                machine.on_signal(&signal, Instant::now())
            }
            Wakeup::SignalsClosed => {
                debug!("media signal stream closed");
                signals_open = false;
                Vec::new()
            }
            Wakeup::Interaction => machine.on_interaction(),
            Wakeup::Deadline => machine.fire_due(Instant::now(), media.ready_state()),
        };

        for effect in effects {
            match effect {
                Effect::Progress(percent) => debug!("progress {}%", percent),
                Effect::Readiness(readiness) => debug!("readiness {:?}", readiness),
                Effect::AttemptPlayback => {
                    if !shared.is_active() {
                        continue;
                    }
                    let result = media.play();
                    if let Err(e) = &result {
                        warn!("playback of {} did not start: {}", media.source(), e);
                    }
                    machine.playback_result(&result);
                }
                Effect::Complete => {
                    let last = machine.status();
                    if shared.shut_down(|status| *status = last) {
                        if let Some(callback) = on_complete.take() {
                            callback();
                        }
                        completed = true;
                    }
                }
            }
        }

        if machine.is_active() {
            shared.publish(machine.status());
        }
    }

    LoadOutcome {
        readiness: machine.readiness(),
        fault: machine.fault().cloned(),
        progress: machine.progress(),
        completed,
    }
}
