//! Cancellation handles for the recurring callbacks of one session.
//!
//! Every session owns a parent [`CancellationToken`]; each loop it arms gets
//! a child token. A loop kind can be armed at most once per session and is
//! cancelled at most once.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    /// Per-frame volume poll while waiting for a vocalization.
    Listen,
    /// Fixed-cadence sampler while recording.
    Sample,
    /// Per-frame repaint while recording.
    Render,
}

impl LoopKind {
    pub const ALL: [LoopKind; 3] = [LoopKind::Listen, LoopKind::Sample, LoopKind::Render];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listen => "listen",
            Self::Sample => "sample",
            Self::Render => "render",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Listen => 0,
            Self::Sample => 1,
            Self::Render => 2,
        }
    }
}

/// A loop that has been armed but not yet handed to the scheduler.
#[derive(Debug, Clone)]
pub struct ArmedLoop {
    pub kind: LoopKind,
    pub token: CancellationToken,
    /// Instant of the first tick.
    pub start: Instant,
    pub period: Duration,
}

#[derive(Debug, Default)]
struct Slot {
    token: Option<CancellationToken>,
    used: bool,
    cancellations: u32,
}

#[derive(Debug)]
pub struct LoopSet {
    session_token: CancellationToken,
    slots: [Slot; 3],
    pending: Vec<ArmedLoop>,
}

impl Default for LoopSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopSet {
    pub fn new() -> Self {
        Self {
            session_token: CancellationToken::new(),
            slots: Default::default(),
            pending: Vec::new(),
        }
    }

    /// Arm `kind`. Returns false when this kind was already armed earlier in
    /// the session.
    pub fn arm(&mut self, kind: LoopKind, start: Instant, period: Duration) -> bool {
        let slot = &mut self.slots[kind.index()];
        if slot.used {
            warn!("Refusing to arm {} loop twice", kind.as_str());
            return false;
        }

        let token = self.session_token.child_token();
        slot.used = true;
        slot.token = Some(token.clone());
        self.pending.push(ArmedLoop {
            kind,
            token,
            start,
            period,
        });
        true
    }

    /// Revoke `kind`. Returns true only for the call that actually cancelled.
    pub fn cancel(&mut self, kind: LoopKind) -> bool {
        let slot = &mut self.slots[kind.index()];
        let Some(token) = slot.token.take() else {
            return false;
        };

        token.cancel();
        slot.cancellations += 1;
        self.pending.retain(|armed| armed.kind != kind);
        true
    }

    pub fn cancel_all(&mut self) {
        for kind in LoopKind::ALL {
            self.cancel(kind);
        }
        self.session_token.cancel();
    }

    pub fn is_armed(&self, kind: LoopKind) -> bool {
        self.slots[kind.index()].token.is_some()
    }

    pub fn armed_count(&self) -> usize {
        LoopKind::ALL.iter().filter(|&&kind| self.is_armed(kind)).count()
    }

    pub fn cancellations(&self, kind: LoopKind) -> u32 {
        self.slots[kind.index()].cancellations
    }

    /// Loops armed since the last call, for the scheduler to start.
    pub fn take_pending(&mut self) -> Vec<ArmedLoop> {
        std::mem::take(&mut self.pending)
    }
}
