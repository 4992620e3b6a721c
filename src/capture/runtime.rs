//! Single-task driver for the capture sessions.
//!
//! Loop tasks only turn interval ticks into [`RuntimeEvent`]s; the driver
//! applies every event to the active session on its own task, so session
//! state is never shared.

use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::loops::{ArmedLoop, LoopKind};
use super::sequencer::SessionSequencer;
use super::session::{SessionReport, TickOutcome};
use super::SessionId;
use crate::export::{SessionExport, SessionHook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    Tick {
        session: SessionId,
        kind: LoopKind,
        at: Instant,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Stop after this many finished sessions.
    pub session_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sessions_started: usize,
    pub sessions_finished: usize,
    pub stale_callbacks: usize,
    /// Loops of the active session still armed when the driver stopped.
    pub loops_armed_at_shutdown: usize,
}

pub struct CaptureRuntime {
    sequencer: SessionSequencer,
    hooks: Vec<Arc<dyn SessionHook>>,
    options: RuntimeOptions,
    tx: mpsc::UnboundedSender<RuntimeEvent>,
    rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    loops: JoinSet<()>,
    hook_tasks: JoinSet<()>,
    summary: RunSummary,
}

impl CaptureRuntime {
    pub fn new(
        sequencer: SessionSequencer,
        hooks: Vec<Arc<dyn SessionHook>>,
        options: RuntimeOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sequencer,
            hooks,
            options,
            tx,
            rx,
            loops: JoinSet::new(),
            hook_tasks: JoinSet::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn sequencer(&self) -> &SessionSequencer {
        &self.sequencer
    }

    /// Run sessions back to back until `shutdown` fires or the session limit
    /// is reached. Outstanding loops are cancelled and hooks awaited before
    /// returning.
    pub async fn run(&mut self, shutdown: CancellationToken) -> RunSummary {
        info!("Capture runtime starting");
        self.sequencer.start_session(Instant::now());
        self.summary.sessions_started += 1;
        self.spawn_pending_loops();

        loop {
            let successor_due = self.sequencer.successor_due();

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                Some(event) = self.rx.recv() => {
                    if self.handle(event).is_break() {
                        break;
                    }
                }
                _ = sleep_until(successor_due.unwrap_or_else(Instant::now)), if successor_due.is_some() => {
                    self.start_successor(Instant::now());
                }
                Some(result) = self.loops.join_next(), if !self.loops.is_empty() => {
                    if let Err(e) = result {
                        warn!("Loop task ended abnormally: {}", e);
                    }
                }
                Some(result) = self.hook_tasks.join_next(), if !self.hook_tasks.is_empty() => {
                    if let Err(e) = result {
                        warn!("Session hook task ended abnormally: {}", e);
                    }
                }
            }
        }

        self.teardown().await
    }

    fn handle(&mut self, event: RuntimeEvent) -> ControlFlow<()> {
        let RuntimeEvent::Tick { session, kind, at } = event;

        let Some(active) = self.sequencer.session_mut(session) else {
            debug!(
                "Dropping {} tick for retired session {}",
                kind.as_str(),
                session
            );
            self.summary.stale_callbacks += 1;
            return ControlFlow::Continue(());
        };

        match active.dispatch(kind, at) {
            TickOutcome::Continue => {}
            TickOutcome::Stale => self.summary.stale_callbacks += 1,
            TickOutcome::StartedRecording => self.spawn_pending_loops(),
            TickOutcome::Finished(report) => {
                self.summary.sessions_finished += 1;
                self.export(&report);

                if let Some(limit) = self.options.session_limit {
                    if self.summary.sessions_finished >= limit {
                        info!("Reached session limit of {}", limit);
                        return ControlFlow::Break(());
                    }
                }
                self.sequencer.on_finished(&report, at);
            }
        }

        ControlFlow::Continue(())
    }

    fn start_successor(&mut self, now: Instant) {
        if self.sequencer.start_successor_if_due(now).is_some() {
            self.summary.sessions_started += 1;
            self.spawn_pending_loops();
        }
    }

    fn spawn_pending_loops(&mut self) {
        let Some(session) = self.sequencer.active_mut() else {
            return;
        };
        let id = session.id();
        for armed in session.take_pending_loops() {
            self.spawn_loop(id, armed);
        }
    }

    fn spawn_loop(&mut self, session: SessionId, armed: ArmedLoop) {
        debug!(
            "Arming {} loop for session {} every {:?}",
            armed.kind.as_str(),
            session,
            armed.period
        );
        let tx = self.tx.clone();

        self.loops.spawn(async move {
            let mut interval = interval_at(armed.start, armed.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = armed.token.cancelled() => break,
                    _ = interval.tick() => {
                        let event = RuntimeEvent::Tick {
                            session,
                            kind: armed.kind,
                            at: Instant::now(),
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn export(&mut self, report: &SessionReport) {
        if self.hooks.is_empty() {
            return;
        }

        let export = SessionExport::from_report(report);
        for hook in &self.hooks {
            let hook = Arc::clone(hook);
            let export = export.clone();
            self.hook_tasks.spawn(async move {
                if let Err(e) = hook.execute(&export).await {
                    warn!("Session hook failed for session #{}: {:?}", export.session_id, e);
                }
            });
        }
    }

    async fn teardown(&mut self) -> RunSummary {
        self.summary.loops_armed_at_shutdown = self
            .sequencer
            .active()
            .map(|session| session.loops().armed_count())
            .unwrap_or(0);
        self.sequencer.shutdown();

        while let Some(result) = self.loops.join_next().await {
            if let Err(e) = result {
                warn!("Loop task ended abnormally: {}", e);
            }
        }
        while let Some(result) = self.hook_tasks.join_next().await {
            if let Err(e) = result {
                warn!("Session hook task ended abnormally: {}", e);
            }
        }

        // Ticks that were queued behind the shutdown are stale by now.
        while let Ok(RuntimeEvent::Tick { session, kind, .. }) = self.rx.try_recv() {
            debug!(
                "Discarding {} tick for session {} after shutdown",
                kind.as_str(),
                session
            );
        }

        info!(
            "Capture runtime stopped: {} started, {} finished, {} stale callbacks",
            self.summary.sessions_started,
            self.summary.sessions_finished,
            self.summary.stale_callbacks
        );
        self.summary.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::render::SvgHost;
    use crate::signal::SharedSignal;
    use std::time::Duration;

    fn runtime(signal: &SharedSignal, limit: Option<usize>) -> CaptureRuntime {
        let sequencer = SessionSequencer::new(
            &Config::default(),
            Arc::new(signal.clone()),
            Box::new(SvgHost::new()),
        );
        CaptureRuntime::new(
            sequencer,
            Vec::new(),
            RuntimeOptions {
                session_limit: limit,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_listening() {
        let signal = SharedSignal::new();
        let mut runtime = runtime(&signal, None);
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });
        let summary = runtime.run(shutdown).await;

        assert_eq!(summary.sessions_started, 1);
        assert_eq!(summary.sessions_finished, 0);
        assert_eq!(summary.loops_armed_at_shutdown, 1);
        let session = runtime.sequencer().active().unwrap();
        assert_eq!(session.loops().armed_count(), 0);
    }

    fn tick(session: u64, kind: LoopKind, at: Instant) -> RuntimeEvent {
        RuntimeEvent::Tick {
            session: SessionId(session),
            kind,
            at,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ticks_are_counted_as_stale() {
        let signal = SharedSignal::new();
        signal.publish(0.5, 220.0);
        let mut runtime = runtime(&signal, None);
        let t0 = Instant::now();
        runtime.sequencer.start_session(t0);

        assert!(runtime.handle(tick(1, LoopKind::Listen, t0)).is_continue());
        signal.publish_volume(0.0);
        let finished_at = t0 + Duration::from_millis(10);
        assert!(runtime
            .handle(tick(1, LoopKind::Sample, finished_at))
            .is_continue());
        assert_eq!(runtime.summary.sessions_finished, 1);
        assert_eq!(runtime.summary.stale_callbacks, 0);

        // Ticks queued before the loops noticed their cancellation.
        runtime.handle(tick(1, LoopKind::Sample, finished_at + Duration::from_millis(10)));
        runtime.handle(tick(1, LoopKind::Render, finished_at + Duration::from_millis(16)));
        assert_eq!(runtime.summary.stale_callbacks, 2);
        assert_eq!(runtime.sequencer.active().unwrap().samples().len(), 1);

        let due = runtime.sequencer.successor_due().unwrap();
        runtime.start_successor(due);
        assert_eq!(runtime.summary.sessions_started, 1);
        assert_eq!(
            runtime.sequencer.active().map(|s| s.id()),
            Some(SessionId(2))
        );

        // Session #1 is retired now.
        runtime.handle(tick(1, LoopKind::Render, due));
        runtime.handle(tick(9, LoopKind::Listen, due));
        assert_eq!(runtime.summary.stale_callbacks, 4);
        assert_eq!(runtime.summary.sessions_finished, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_session_limit() {
        let signal = SharedSignal::new();
        signal.publish(0.5, 220.0);
        let mut runtime = runtime(&signal, Some(1));

        let summary = runtime.run(CancellationToken::new()).await;

        assert_eq!(summary.sessions_started, 1);
        assert_eq!(summary.sessions_finished, 1);
        assert_eq!(summary.loops_armed_at_shutdown, 0);
    }
}
