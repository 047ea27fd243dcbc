//! End-to-end loader scenarios on a paused tokio clock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use readygate::media::{MediaSignal, ReadyState, ScriptedMedia};
use readygate::{
    Error, GatePhase, LoaderConfig, LoaderHandle, LoaderStatus, MediaReadinessController,
    PlaybackStatus, Readiness,
};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

struct Harness {
    media: Arc<ScriptedMedia>,
    handle: LoaderHandle,
    calls: Arc<AtomicUsize>,
    completed_at: Arc<Mutex<Option<Instant>>>,
    start: Instant,
}

fn activate(config: LoaderConfig) -> Harness {
    let media = Arc::new(ScriptedMedia::new("/videos/intro.mp4"));
    let calls = Arc::new(AtomicUsize::new(0));
    let completed_at = Arc::new(Mutex::new(None));
    let start = Instant::now();
    let (c, at) = (calls.clone(), completed_at.clone());
    let handle = MediaReadinessController::activate(media.clone(), config, move || {
        c.fetch_add(1, Ordering::SeqCst);
        *at.lock().unwrap() = Some(Instant::now());
    })
    .expect("activate");
    Harness {
        media,
        handle,
        calls,
        completed_at,
        start,
    }
}

/// Record every status the loader publishes until it goes away.
fn record(handle: &LoaderHandle) -> JoinHandle<Vec<LoaderStatus>> {
    let mut rx = handle.subscribe();
    tokio::spawn(async move {
        let mut seen = vec![rx.borrow_and_update().clone()];
        while rx.changed().await.is_ok() {
            seen.push(rx.borrow_and_update().clone());
        }
        seen
    })
}

fn elapsed_to_completion(h: &Harness) -> Duration {
    h.completed_at
        .lock()
        .unwrap()
        .expect("completion callback fired")
        .duration_since(h.start)
}

fn assert_close(actual: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(50),
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn metadata_resolves_ready_and_data_is_a_noop() {
    let h = activate(LoaderConfig::default());
    assert_eq!(h.media.load_calls(), 1);
    assert_eq!(h.handle.progress(), 20);

    h.media.emit(MediaSignal::LoadStart);
    h.media.emit(MediaSignal::MetadataReady);
    h.media.emit(MediaSignal::DataReady);
    sleep(Duration::from_millis(10)).await;

    let status = h.handle.status();
    assert_eq!(status.readiness, Readiness::Ready);
    assert!(status.show_media());
    assert!(status.fault.is_none());

    let Harness { handle, calls, .. } = h;
    let outcome = handle.join().await.unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.readiness, Readiness::Ready);
    assert_eq!(outcome.progress, 100);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn load_error_still_completes_on_fixed_schedule() {
    let h = activate(LoaderConfig::default());
    h.media.emit(MediaSignal::LoadStart);
    h.media.emit(MediaSignal::LoadError("404 Not Found".into()));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.handle.readiness(), Readiness::Errored);

    sleep(Duration::from_millis(6000)).await;
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_close(elapsed_to_completion(&h), 1600 + 4000);
    assert_eq!(h.media.play_attempts(), 0);

    let Harness { handle, .. } = h;
    let outcome = handle.join().await.unwrap();
    assert_eq!(
        outcome.fault,
        Some(Error::MediaLoadError("404 Not Found".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn silent_media_hits_watchdog_then_completes() {
    let h = activate(LoaderConfig::default());
    let recorder = record(&h.handle);

    sleep(Duration::from_millis(2900)).await;
    assert_eq!(h.handle.readiness(), Readiness::Pending);
    assert_eq!(h.handle.progress(), 80);

    sleep(Duration::from_millis(200)).await;
    let status = h.handle.status();
    assert_eq!(status.readiness, Readiness::Errored);
    assert_eq!(status.progress, 100);
    assert_eq!(status.phase, GatePhase::WaitingOnDisplayTime);
    assert!(status.fault.unwrap().contains("3000ms"));

    let Harness {
        handle,
        calls,
        completed_at,
        start,
        ..
    } = h;
    let outcome = handle.join().await.unwrap();
    assert_eq!(outcome.fault, Some(Error::WatchdogTimeout(3000)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let done = completed_at.lock().unwrap().unwrap().duration_since(start);
    assert_close(done, 7000);
    assert!(done <= LoaderConfig::default().completion_bound() + Duration::from_millis(50));

    let seen = recorder.await.unwrap();
    let progress: Vec<u8> = seen.iter().map(|s| s.progress).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    let last = seen.last().unwrap();
    assert_eq!(last.phase, GatePhase::Complete);
    assert_eq!(last.progress, 100);
    assert!(!last.active);
}

#[tokio::test(start_paused = true)]
async fn watchdog_accepts_metadata_seen_before_subscribing() {
    let h = activate(LoaderConfig::default());
    h.media.set_ready_state(ReadyState::HaveMetadata);

    sleep(Duration::from_millis(3010)).await;
    let status = h.handle.status();
    assert_eq!(status.readiness, Readiness::Ready);
    assert!(status.fault.is_none());
}

#[tokio::test(start_paused = true)]
async fn duplicate_and_late_signals_fire_completion_once() {
    let h = activate(LoaderConfig::default());
    for _ in 0..3 {
        h.media.emit(MediaSignal::CanPlay);
        h.media.emit(MediaSignal::CanPlayFully);
        h.media.emit(MediaSignal::LoadError("late".into()));
    }
    sleep(Duration::from_millis(8000)).await;
    h.media.emit(MediaSignal::CanPlay);
    sleep(Duration::from_millis(8000)).await;

    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.handle.readiness(), Readiness::Ready);
    assert_close(elapsed_to_completion(&h), 1600 + 4000);
}

#[tokio::test(start_paused = true)]
async fn ready_media_autoplays_once() {
    let h = activate(LoaderConfig::default());
    h.media.emit(MediaSignal::CanPlay);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(h.media.play_attempts(), 1);
    assert!(h.media.is_playing());
    assert_eq!(h.handle.status().playback, PlaybackStatus::Playing);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.media.play_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn blocked_autoplay_keeps_ready_and_interaction_retries() {
    let h = activate(LoaderConfig::default());
    h.media.block_autoplay(true);
    h.media.emit(MediaSignal::DataReady);

    sleep(Duration::from_millis(300)).await;
    let status = h.handle.status();
    assert_eq!(status.readiness, Readiness::Ready);
    assert_eq!(status.playback, PlaybackStatus::Blocked);

    h.media.block_autoplay(false);
    h.handle.interact();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(h.handle.status().playback, PlaybackStatus::Playing);
    assert_eq!(h.media.play_attempts(), 2);

    h.handle.interact();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(h.media.play_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn interaction_before_ready_does_not_play() {
    let h = activate(LoaderConfig::default());
    h.handle.interact();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(h.media.play_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn teardown_freezes_state_and_suppresses_callback() {
    let mut h = activate(LoaderConfig::default());
    sleep(Duration::from_millis(500)).await;
    let before = h.handle.status();
    assert_eq!(before.progress, 40);

    h.handle.teardown();
    assert!(!h.handle.is_active());
    h.media.emit(MediaSignal::CanPlay);
    sleep(Duration::from_millis(10_000)).await;

    let after = h.handle.status();
    assert_eq!(after.progress, before.progress);
    assert_eq!(after.readiness, Readiness::Pending);
    assert_eq!(after.phase, GatePhase::WaitingOnProgress);
    assert!(!after.active);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.media.play_attempts(), 0);
    assert_eq!(h.media.subscriber_count(), 0);

    let Harness { handle, .. } = h;
    let outcome = handle.join().await.unwrap();
    assert!(!outcome.completed);
    assert_eq!(outcome.readiness, Readiness::Pending);
}

#[tokio::test(start_paused = true)]
async fn teardown_on_a_due_step_tick_freezes_progress() {
    let mut h = activate(LoaderConfig::default());
    // lands exactly on the 400ms progress step deadline
    sleep(Duration::from_millis(400)).await;
    h.handle.teardown();
    let frozen = h.handle.status();
    assert!(frozen.progress == 20 || frozen.progress == 40, "{:?}", frozen);
    assert!(!frozen.active);

    h.media.emit(MediaSignal::CanPlay);
    sleep(Duration::from_millis(10_000)).await;

    assert_eq!(h.handle.status(), frozen);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.media.play_attempts(), 0);

    let Harness { handle, .. } = h;
    let outcome = handle.join().await.unwrap();
    assert!(!outcome.completed);
    assert_eq!(outcome.progress, frozen.progress);
}

#[tokio::test(start_paused = true)]
async fn teardown_on_the_display_deadline_never_double_signals() {
    let mut h = activate(LoaderConfig::default());
    h.media.emit(MediaSignal::LoadError("404".into()));
    // 1600ms hold start + 4000ms display: the completion tick itself
    sleep(Duration::from_millis(5600)).await;
    let was_active = h.handle.is_active();
    h.handle.teardown();
    let frozen = h.handle.status();
    assert!(!frozen.active);

    sleep(Duration::from_millis(10_000)).await;
    assert_eq!(h.handle.status(), frozen);
    let expected_calls = if was_active { 0 } else { 1 };
    assert_eq!(h.calls.load(Ordering::SeqCst), expected_calls);

    let Harness { handle, .. } = h;
    let outcome = handle.join().await.unwrap();
    assert_eq!(outcome.completed, !was_active);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_unsubscribes() {
    let h = activate(LoaderConfig::default());
    assert_eq!(h.media.subscriber_count(), 1);
    let Harness {
        media,
        handle,
        calls,
        ..
    } = h;
    drop(handle);
    sleep(Duration::from_millis(10_000)).await;
    assert_eq!(media.subscriber_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn hold_backstop_completes_when_watchdog_is_long() {
    let config = LoaderConfig {
        watchdog_timeout_ms: 60_000,
        max_readiness_wait_ms: 1000,
        ..LoaderConfig::default()
    };
    let h = activate(config.clone());
    sleep(Duration::from_millis(8000)).await;
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_close(elapsed_to_completion(&h), 6600);
    assert!(elapsed_to_completion(&h) <= config.completion_bound() + Duration::from_millis(50));

    let Harness { handle, .. } = h;
    let outcome = handle.join().await.unwrap();
    assert_eq!(outcome.fault, Some(Error::ReadinessHoldTimeout(1000)));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let media = Arc::new(ScriptedMedia::new("/videos/intro.mp4"));
    let config = LoaderConfig {
        checkpoints: vec![60, 30],
        ..LoaderConfig::default()
    };
    let res = MediaReadinessController::activate(media.clone(), config, || {});
    assert!(matches!(res, Err(Error::ConfigError(_))));
    assert_eq!(media.load_calls(), 0);
}

#[test]
fn activation_outside_a_runtime_fails() {
    let media = Arc::new(ScriptedMedia::new("/videos/intro.mp4"));
    let res = MediaReadinessController::activate(media, LoaderConfig::default(), || {});
    assert!(matches!(res, Err(Error::InitializationError(_))));
}

#[tokio::test(start_paused = true)]
async fn works_with_a_trait_object_handle() {
    let media = Arc::new(ScriptedMedia::new("/videos/intro.mp4"));
    let dyn_media: Arc<dyn readygate::media::MediaHandle> = media.clone();
    let handle =
        MediaReadinessController::activate(dyn_media, LoaderConfig::default(), || {}).unwrap();
    media.emit(MediaSignal::MetadataReady);
    let outcome = handle.join().await.unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.readiness, Readiness::Ready);
}
