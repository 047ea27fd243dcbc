use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;
use readygate::media::{MediaSignal, ReadyState, ScriptedMedia};
use readygate::{LoaderConfig, LoaderStatus, MediaReadinessController};
use serde_json::json;
use tokio::time::Instant;

/// Run a loader against scripted media and print every status change as JSON.
#[derive(Parser, Debug)]
#[command(name = "readygate", version, about)]
struct Cli {
    /// JSON loader configuration; missing fields use the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit a media signal at a time offset, e.g. `metadata-ready@250`
    #[arg(long = "signal", value_name = "NAME@MS")]
    signals: Vec<TimedSignal>,

    /// Ready state reported when polled, without any signal being emitted
    #[arg(long, value_name = "STATE")]
    ready_state: Option<ReadyState>,

    /// Refuse playback the way a browser autoplay policy does
    #[arg(long)]
    block_autoplay: bool,

    /// Simulate a viewer click at a time offset (repeatable)
    #[arg(long, value_name = "MS")]
    interact_at: Vec<u64>,

    /// Tear the loader down at a time offset
    #[arg(long, value_name = "MS")]
    teardown_at: Option<u64>,

    /// Media source reported in logs
    #[arg(long, default_value = "/videos/intro.mp4")]
    source: String,
}

#[derive(Debug, Clone)]
struct TimedSignal {
    signal: MediaSignal,
    at_ms: u64,
}

impl FromStr for TimedSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, at) = s
            .rsplit_once('@')
            .ok_or_else(|| format!("expected NAME@MS, got '{}'", s))?;
        let signal = name.parse::<MediaSignal>().map_err(|e| e.to_string())?;
        let at_ms = at
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("bad offset '{}': {}", at, e))?;
        Ok(TimedSignal { signal, at_ms })
    }
}

enum HostAction {
    Interact,
    Teardown,
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn print_status(start: Instant, status: &LoaderStatus) {
    let line = json!({
        "t_ms": elapsed_ms(start),
        "status": status,
    });
    println!("{}", line);
}

async fn simulate(cli: Cli, config: LoaderConfig) -> anyhow::Result<()> {
    let media = Arc::new(ScriptedMedia::new(cli.source.clone()));
    if let Some(ready_state) = cli.ready_state {
        media.set_ready_state(ready_state);
    }
    media.block_autoplay(cli.block_autoplay);

    let start = Instant::now();
    let mut handle = MediaReadinessController::activate(media.clone(), config, || {
        info!("completion callback fired");
    })?;

    let mut rx = handle.subscribe();
    print_status(start, &rx.borrow_and_update());
    let printer = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            print_status(start, &status);
        }
    });

    for timed in cli.signals {
        let media = media.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(start + Duration::from_millis(timed.at_ms)).await;
            media.emit(timed.signal);
        });
    }

    let mut actions: Vec<(u64, HostAction)> = cli
        .interact_at
        .iter()
        .map(|&ms| (ms, HostAction::Interact))
        .collect();
    if let Some(ms) = cli.teardown_at {
        actions.push((ms, HostAction::Teardown));
    }
    actions.sort_by_key(|(ms, _)| *ms);

    for (at_ms, action) in actions {
        if !handle.is_active() {
            break;
        }
        tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
        match action {
            HostAction::Interact => handle.interact(),
            HostAction::Teardown => handle.teardown(),
        }
    }

    let outcome = handle.join().await?;
    printer.await.context("status printer failed")?;

    let line = json!({
        "t_ms": elapsed_ms(start),
        "outcome": {
            "readiness": outcome.readiness,
            "fault": outcome.fault.map(|e| e.to_string()),
            "progress": outcome.progress,
            "completed": outcome.completed,
        }
    });
    println!("{}", line);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            LoaderConfig::from_json_str(&text)?
        }
        None => LoaderConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(simulate(cli, config))
}
