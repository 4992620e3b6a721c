//! Capture lifecycle: listening for a vocalization, sampling it at a fixed
//! cadence, and chaining the next session once one finishes.

pub mod loops;
pub mod runtime;
pub mod sampler;
pub mod sequencer;
pub mod session;

pub use loops::{ArmedLoop, LoopKind, LoopSet};
pub use runtime::{CaptureRuntime, RunSummary, RuntimeEvent, RuntimeOptions};
pub use sampler::{FinishReason, Sampler, SamplerTick};
pub use sequencer::SessionSequencer;
pub use session::{CaptureSession, CaptureSettings, SessionPhase, SessionReport, TickOutcome};

use serde::{Deserialize, Serialize};
use std::fmt;

/// One pitch reading, stamped with the logical recording time it was taken
/// at (milliseconds since the recording baseline).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub pitch: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
