use crate::capture::{CaptureRuntime, RunSummary, RuntimeOptions, SessionSequencer};
use crate::config::Config;
use crate::export::{LogHook, SessionHook, ShellCommandHook};
use crate::global;
use crate::render::SvgHost;
use crate::signal::{HumSynth, MicSignalSource, SharedSignal};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Live capture from the default microphone until Ctrl-C.
pub async fn run_listen(config: Config, snapshot: Option<PathBuf>) -> Result<()> {
    info!("Starting humtrace listener");

    let signal = SharedSignal::new();
    let mut mic = MicSignalSource::start(&config.signal, signal.clone())
        .context("Failed to open microphone input")?;
    let host = SvgHost::new();
    let mut runtime = build_runtime(&config, signal, host.clone(), RuntimeOptions::default());

    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());
    info!("Hum into the microphone. Press Ctrl-C to stop.");

    let frame = config.render.frame_interval();
    let pump = async {
        let mut ticker = interval(frame);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => mic.refresh(),
            }
        }
    };
    let driver = async {
        let summary = runtime.run(shutdown.clone()).await;
        shutdown.cancel();
        summary
    };
    let (summary, ()) = tokio::join!(driver, pump);
    mic.stop();

    log_summary(&summary);

    let snapshot = match snapshot {
        Some(path) => path,
        None => global::snapshot_file()?,
    };
    host.write_snapshot(&snapshot)?;
    Ok(())
}

/// Drive the capture pipeline with scripted hums.
pub async fn run_simulation(config: Config, sessions: usize, snapshot: Option<PathBuf>) -> Result<()> {
    if sessions == 0 {
        bail!("Nothing to simulate: --sessions must be at least 1");
    }
    info!("Simulating {} hummed sessions", sessions);

    let signal = SharedSignal::new();
    let synth = HumSynth::default();
    let host = SvgHost::new();
    let mut runtime = build_runtime(
        &config,
        signal.clone(),
        host.clone(),
        RuntimeOptions {
            session_limit: Some(sessions),
        },
    );

    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());

    let frame = config.render.frame_interval();
    let started = Instant::now();
    let pump = async {
        let mut ticker = interval(frame);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => synth.publish(started.elapsed(), &signal),
            }
        }
    };
    let driver = async {
        let summary = runtime.run(shutdown.clone()).await;
        shutdown.cancel();
        summary
    };
    let (summary, ()) = tokio::join!(driver, pump);

    log_summary(&summary);

    if let Some(path) = snapshot {
        host.write_snapshot(&path)?;
    }
    Ok(())
}

pub fn build_runtime(
    config: &Config,
    signal: SharedSignal,
    host: SvgHost,
    options: RuntimeOptions,
) -> CaptureRuntime {
    let sequencer = SessionSequencer::new(config, Arc::new(signal), Box::new(host));
    CaptureRuntime::new(sequencer, build_hooks(config), options)
}

pub fn build_hooks(config: &Config) -> Vec<Arc<dyn SessionHook>> {
    let mut hooks: Vec<Arc<dyn SessionHook>> = vec![Arc::new(LogHook) as Arc<dyn SessionHook>];
    if !config.export.post_command.trim().is_empty() {
        hooks.push(Arc::new(ShellCommandHook::new(
            config.export.post_command.clone(),
            config.export.post_command_timeout_seconds,
        )));
    }
    hooks
}

fn spawn_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Received Ctrl-C, stopping");
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            },
        }
    });
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Captured {} of {} sessions ({} stale callbacks ignored)",
        summary.sessions_finished, summary.sessions_started, summary.stale_callbacks
    );
}
