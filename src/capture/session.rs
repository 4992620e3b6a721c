//! One capture session and its state machine.
//!
//! `Idle -> Listening -> Recording -> Finished`. Listening polls the volume
//! every frame; crossing the start threshold begins fixed-cadence sampling
//! and the per-frame repaint. Recording ends when the capture window is
//! used up or the volume drops below the stop threshold.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::loops::{ArmedLoop, LoopKind, LoopSet};
use super::sampler::{FinishReason, Sampler, SamplerTick};
use super::{Sample, SessionId};
use crate::config::Config;
use crate::render::{SessionRenderer, Surface};
use crate::signal::SignalSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Listening,
    Recording,
    Finished,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Recording => "recording",
            Self::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub start_threshold: f64,
    pub stop_threshold: f64,
    pub capture_window_ms: f64,
    pub sample_interval: Duration,
    pub frame_interval: Duration,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            start_threshold: config.capture.start_threshold,
            stop_threshold: config.capture.stop_threshold,
            capture_window_ms: config.capture.capture_window_ms,
            sample_interval: config.capture.sample_interval(),
            frame_interval: config.render.frame_interval(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The finished raw buffer, emitted once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub reason: FinishReason,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Continue,
    /// The callback's loop is no longer armed; nothing was done.
    Stale,
    StartedRecording,
    Finished(SessionReport),
}

pub struct CaptureSession {
    id: SessionId,
    phase: SessionPhase,
    settings: CaptureSettings,
    source: Arc<dyn SignalSource>,
    renderer: SessionRenderer,
    surface: Box<dyn Surface>,
    sampler: Option<Sampler>,
    loops: LoopSet,
}

impl CaptureSession {
    pub fn new(
        id: SessionId,
        settings: CaptureSettings,
        renderer: SessionRenderer,
        source: Arc<dyn SignalSource>,
        surface: Box<dyn Surface>,
    ) -> Self {
        Self {
            id,
            phase: SessionPhase::Idle,
            settings,
            source,
            renderer,
            surface,
            sampler: None,
            loops: LoopSet::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn loops(&self) -> &LoopSet {
        &self.loops
    }

    /// Raw buffer so far; empty until recording starts.
    pub fn samples(&self) -> &[Sample] {
        self.sampler.as_ref().map(Sampler::samples).unwrap_or(&[])
    }

    /// Loops armed by the last transitions that still need a scheduler.
    pub fn take_pending_loops(&mut self) -> Vec<ArmedLoop> {
        self.loops.take_pending()
    }

    pub fn start_listening(&mut self, now: Instant) -> TickOutcome {
        if self.phase != SessionPhase::Idle {
            return self.stale(LoopKind::Listen);
        }

        self.phase = SessionPhase::Listening;
        self.loops
            .arm(LoopKind::Listen, now, self.settings.frame_interval);
        info!("Session {} listening", self.id);
        TickOutcome::Continue
    }

    pub fn dispatch(&mut self, kind: LoopKind, now: Instant) -> TickOutcome {
        match kind {
            LoopKind::Listen => self.on_listen_frame(now),
            LoopKind::Sample => self.on_sample_tick(now),
            LoopKind::Render => self.on_render_frame(),
        }
    }

    pub fn on_listen_frame(&mut self, now: Instant) -> TickOutcome {
        if self.phase != SessionPhase::Listening || !self.loops.is_armed(LoopKind::Listen) {
            return self.stale(LoopKind::Listen);
        }

        if self.source.current_volume() > self.settings.start_threshold {
            self.start_recording(now);
            return TickOutcome::StartedRecording;
        }
        TickOutcome::Continue
    }

    pub fn on_sample_tick(&mut self, now: Instant) -> TickOutcome {
        if self.phase != SessionPhase::Recording || !self.loops.is_armed(LoopKind::Sample) {
            return self.stale(LoopKind::Sample);
        }
        let Some(sampler) = self.sampler.as_mut() else {
            return self.stale(LoopKind::Sample);
        };

        match sampler.tick(now, self.source.as_ref()) {
            SamplerTick::Continue => TickOutcome::Continue,
            SamplerTick::Stop(reason) => TickOutcome::Finished(self.finish(reason)),
        }
    }

    pub fn on_render_frame(&mut self) -> TickOutcome {
        if self.phase != SessionPhase::Recording || !self.loops.is_armed(LoopKind::Render) {
            return self.stale(LoopKind::Render);
        }

        self.paint();
        TickOutcome::Continue
    }

    /// Revoke every outstanding loop, whatever the phase.
    pub fn shutdown(&mut self) {
        self.loops.cancel_all();
    }

    fn start_recording(&mut self, now: Instant) {
        self.loops.cancel(LoopKind::Listen);
        self.phase = SessionPhase::Recording;
        self.sampler = Some(Sampler::new(
            now,
            self.settings.capture_window_ms,
            self.settings.stop_threshold,
        ));

        let sample_interval = self.settings.sample_interval;
        self.loops
            .arm(LoopKind::Sample, now + sample_interval, sample_interval);
        self.loops
            .arm(LoopKind::Render, now, self.settings.frame_interval);
        info!("Session {} recording", self.id);
    }

    fn finish(&mut self, reason: FinishReason) -> SessionReport {
        self.phase = SessionPhase::Finished;
        self.loops.cancel(LoopKind::Sample);
        // Last paint so the complete buffer stays on screen.
        let stats = self.paint();
        self.loops.cancel(LoopKind::Render);

        let samples = self.samples().to_vec();
        info!(
            "Session {} finished ({}): {} samples, {} fitted segments",
            self.id,
            reason.as_str(),
            samples.len(),
            stats.fitted_segments
        );

        SessionReport {
            session_id: self.id,
            reason,
            samples,
        }
    }

    fn paint(&mut self) -> crate::render::RenderStats {
        let samples = self.sampler.as_ref().map(Sampler::samples).unwrap_or(&[]);
        self.renderer.render(samples, self.surface.as_mut())
    }

    fn stale(&self, kind: LoopKind) -> TickOutcome {
        debug!(
            "Ignoring stale {} callback for session {} in phase {}",
            kind.as_str(),
            self.id,
            self.phase.as_str()
        );
        TickOutcome::Stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCommand, SvgSurface};
    use crate::signal::SharedSignal;

    struct Fixture {
        session: CaptureSession,
        signal: SharedSignal,
        surface: std::rc::Rc<std::cell::RefCell<crate::render::Canvas>>,
        t0: Instant,
    }

    fn fixture() -> Fixture {
        let signal = SharedSignal::new();
        let surface = SvgSurface::new(300, 150);
        let canvas = surface.canvas();
        let session = CaptureSession::new(
            SessionId(1),
            CaptureSettings::default(),
            SessionRenderer::new(1000.0, 1.0),
            Arc::new(signal.clone()),
            Box::new(surface),
        );
        Fixture {
            session,
            signal,
            surface: canvas,
            t0: Instant::now(),
        }
    }

    fn ms(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    /// Listening, then loud on the first frame.
    fn recording_fixture() -> Fixture {
        let mut f = fixture();
        f.session.start_listening(f.t0);
        f.signal.publish(0.5, 220.0);
        assert_eq!(
            f.session.on_listen_frame(f.t0),
            TickOutcome::StartedRecording
        );
        f
    }

    #[test]
    fn test_start_listening_arms_listen_loop() {
        let mut f = fixture();
        assert_eq!(f.session.phase(), SessionPhase::Idle);

        f.session.start_listening(f.t0);

        assert_eq!(f.session.phase(), SessionPhase::Listening);
        let pending = f.session.take_pending_loops();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, LoopKind::Listen);
        assert_eq!(pending[0].period, Duration::from_millis(16));
    }

    #[test]
    fn test_quiet_session_keeps_listening() {
        let mut f = fixture();
        f.session.start_listening(f.t0);
        f.signal.publish(0.1, 200.0);

        for frame in 0..500 {
            let outcome = f.session.on_listen_frame(ms(f.t0, frame * 16));
            assert_eq!(outcome, TickOutcome::Continue);
        }
        assert_eq!(f.session.phase(), SessionPhase::Listening);
        assert!(f.session.samples().is_empty());
    }

    #[test]
    fn test_loud_frame_starts_recording() {
        let mut f = fixture();
        f.session.start_listening(f.t0);
        f.session.take_pending_loops();

        f.signal.publish(0.11, 200.0);
        let outcome = f.session.on_listen_frame(ms(f.t0, 32));

        assert_eq!(outcome, TickOutcome::StartedRecording);
        assert_eq!(f.session.phase(), SessionPhase::Recording);
        assert!(!f.session.loops().is_armed(LoopKind::Listen));
        assert_eq!(f.session.loops().cancellations(LoopKind::Listen), 1);

        let pending = f.session.take_pending_loops();
        let kinds: Vec<LoopKind> = pending.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![LoopKind::Sample, LoopKind::Render]);
        assert_eq!(pending[0].start, ms(f.t0, 42));
    }

    #[test]
    fn test_volume_drop_finishes_on_that_tick() {
        let mut f = recording_fixture();

        for i in 1..=5 {
            assert_eq!(
                f.session.on_sample_tick(ms(f.t0, i * 10)),
                TickOutcome::Continue
            );
        }
        f.signal.publish_volume(0.02);
        let outcome = f.session.on_sample_tick(ms(f.t0, 60));

        let TickOutcome::Finished(report) = outcome else {
            panic!("expected finish, got {outcome:?}");
        };
        assert_eq!(report.reason, FinishReason::VolumeDropped);
        assert_eq!(report.samples.len(), 6);
        assert_eq!(report.session_id, SessionId(1));
        assert_eq!(f.session.phase(), SessionPhase::Finished);
    }

    #[test]
    fn test_capture_window_finishes_recording() {
        let mut f = recording_fixture();

        let mut tick = 1;
        let report = loop {
            match f.session.on_sample_tick(ms(f.t0, tick * 10)) {
                TickOutcome::Continue => tick += 1,
                TickOutcome::Finished(report) => break report,
                other => panic!("unexpected {other:?}"),
            }
        };

        assert_eq!(report.reason, FinishReason::CaptureWindowElapsed);
        assert_eq!(tick, 101);
        assert!(report
            .samples
            .windows(2)
            .all(|w| w[0].duration <= w[1].duration));
    }

    #[test]
    fn test_finish_tears_down_both_loops_once() {
        let mut f = recording_fixture();
        let tokens: Vec<_> = f
            .session
            .take_pending_loops()
            .into_iter()
            .map(|a| a.token)
            .collect();

        f.session.on_sample_tick(ms(f.t0, 10));
        f.signal.publish_volume(0.0);
        f.session.on_sample_tick(ms(f.t0, 20));

        assert_eq!(f.session.loops().armed_count(), 0);
        assert!(tokens.iter().all(|t| t.is_cancelled()));
        assert_eq!(f.session.loops().cancellations(LoopKind::Sample), 1);
        assert_eq!(f.session.loops().cancellations(LoopKind::Render), 1);

        f.session.shutdown();
        assert_eq!(f.session.loops().cancellations(LoopKind::Render), 1);
    }

    #[test]
    fn test_stale_ticks_after_finish_do_nothing() {
        let mut f = recording_fixture();
        f.session.on_sample_tick(ms(f.t0, 10));
        f.signal.publish_volume(0.0);
        assert!(matches!(
            f.session.on_sample_tick(ms(f.t0, 20)),
            TickOutcome::Finished(_)
        ));
        let clears = f.surface.borrow().clear_count();

        f.signal.publish_volume(0.9);
        for i in 3..20 {
            assert_eq!(
                f.session.on_sample_tick(ms(f.t0, i * 10)),
                TickOutcome::Stale
            );
            assert_eq!(f.session.on_render_frame(), TickOutcome::Stale);
            assert_eq!(
                f.session.on_listen_frame(ms(f.t0, i * 10)),
                TickOutcome::Stale
            );
        }

        assert_eq!(f.session.samples().len(), 2);
        assert_eq!(f.session.phase(), SessionPhase::Finished);
        assert_eq!(f.surface.borrow().clear_count(), clears);
    }

    #[test]
    fn test_sample_tick_while_listening_is_stale() {
        let mut f = fixture();
        f.session.start_listening(f.t0);

        assert_eq!(f.session.on_sample_tick(ms(f.t0, 10)), TickOutcome::Stale);
        assert_eq!(f.session.on_render_frame(), TickOutcome::Stale);
        assert_eq!(f.session.start_listening(f.t0), TickOutcome::Stale);
    }

    #[test]
    fn test_render_frame_paints_live_buffer() {
        let mut f = recording_fixture();
        f.session.on_sample_tick(ms(f.t0, 10));
        f.signal.publish_pitch(260.0);
        f.session.on_sample_tick(ms(f.t0, 20));

        assert_eq!(f.session.on_render_frame(), TickOutcome::Continue);

        let canvas = f.surface.borrow();
        let lines = canvas
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count();
        assert_eq!(lines, 1);
    }

    #[test]
    fn test_single_sample_session_keeps_raw_trace() {
        let mut f = recording_fixture();
        f.signal.publish_volume(0.0);

        let outcome = f.session.on_sample_tick(ms(f.t0, 10));

        let TickOutcome::Finished(report) = outcome else {
            panic!("expected finish");
        };
        assert_eq!(report.samples.len(), 1);
        let canvas = f.surface.borrow();
        assert!(matches!(canvas.commands(), [DrawCommand::Line { .. }]));
    }
}
