//! Chains capture sessions: one active session at a time, each new one
//! mounted above its predecessor after a short delay.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::session::{CaptureSession, CaptureSettings, SessionReport};
use super::SessionId;
use crate::config::Config;
use crate::render::{HostContainer, MountPosition, SessionRenderer};
use crate::signal::SignalSource;

pub struct SessionSequencer {
    settings: CaptureSettings,
    renderer: SessionRenderer,
    source: Arc<dyn SignalSource>,
    host: Box<dyn HostContainer>,
    width: u32,
    height: u32,
    successor_delay: Duration,
    active: Option<CaptureSession>,
    /// Mounted sessions, newest first.
    mount_order: Vec<SessionId>,
    next_id: u64,
    successor_due: Option<Instant>,
}

impl SessionSequencer {
    pub fn new(
        config: &Config,
        source: Arc<dyn SignalSource>,
        host: Box<dyn HostContainer>,
    ) -> Self {
        Self {
            settings: CaptureSettings::from_config(config),
            renderer: SessionRenderer::from_config(config),
            source,
            host,
            width: config.render.width,
            height: config.render.height,
            successor_delay: config.sequencer.next_session_delay(),
            active: None,
            mount_order: Vec::new(),
            next_id: 1,
            successor_due: None,
        }
    }

    /// Create a session on a fresh surface and start it listening.
    ///
    /// The new surface goes before the most recent one. Whatever session was
    /// active is retired first.
    pub fn start_session(&mut self, now: Instant) -> &mut CaptureSession {
        if let Some(mut previous) = self.active.take() {
            previous.shutdown();
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;

        let position = match self.mount_order.first() {
            Some(&newest) => MountPosition::Before(newest),
            None => MountPosition::Append,
        };
        let surface = self.host.mount(id, position, self.width, self.height);
        self.mount_order.insert(0, id);
        self.successor_due = None;

        let mut session = CaptureSession::new(
            id,
            self.settings.clone(),
            self.renderer.clone(),
            Arc::clone(&self.source),
            surface,
        );
        session.start_listening(now);
        info!("Started session {}", id);

        self.active.insert(session)
    }

    /// Record that the active session finished; returns when its successor
    /// is due.
    pub fn on_finished(&mut self, report: &SessionReport, now: Instant) -> Instant {
        let due = now + self.successor_delay;
        self.successor_due = Some(due);
        info!(
            "Session {} done, next session in {:?}",
            report.session_id, self.successor_delay
        );
        due
    }

    pub fn successor_due(&self) -> Option<Instant> {
        self.successor_due
    }

    /// Start the successor once its delay has passed.
    pub fn start_successor_if_due(&mut self, now: Instant) -> Option<&mut CaptureSession> {
        let due = self.successor_due?;
        if now < due {
            return None;
        }
        Some(self.start_session(now))
    }

    pub fn active(&self) -> Option<&CaptureSession> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut CaptureSession> {
        self.active.as_mut()
    }

    /// The active session, if it is `id`.
    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut CaptureSession> {
        self.active.as_mut().filter(|session| session.id() == id)
    }

    pub fn mount_order(&self) -> &[SessionId] {
        &self.mount_order
    }

    pub fn shutdown(&mut self) {
        self.successor_due = None;
        if let Some(session) = self.active.as_mut() {
            session.shutdown();
        }
    }
}
