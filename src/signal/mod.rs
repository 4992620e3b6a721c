//! Live pitch/volume readings consumed by the capture core.
//!
//! The core never estimates anything itself: it reads the two scalars a
//! [`SignalSource`] publishes, at most once per tick.

pub mod mic_source;
pub mod synth;

pub use mic_source::{MicSignalSource, SignalError};
pub use synth::HumSynth;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read side of the external pitch tracker.
pub trait SignalSource {
    /// Normalized loudness in `0.0..=1.0`.
    fn current_volume(&self) -> f64;

    /// Detected fundamental frequency (or an equivalent scalar).
    fn current_pitch(&self) -> f64;
}

/// Latest readings, shared between a publisher (audio analysis, synth,
/// tests) and the capture core.
#[derive(Clone, Default)]
pub struct SharedSignal {
    inner: Arc<Readings>,
}

#[derive(Default)]
struct Readings {
    volume: AtomicU64,
    pitch: AtomicU64,
}

impl SharedSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, volume: f64, pitch: f64) {
        self.inner.volume.store(volume.to_bits(), Ordering::Relaxed);
        self.inner.pitch.store(pitch.to_bits(), Ordering::Relaxed);
    }

    pub fn publish_volume(&self, volume: f64) {
        self.inner.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn publish_pitch(&self, pitch: f64) {
        self.inner.pitch.store(pitch.to_bits(), Ordering::Relaxed);
    }
}

impl SignalSource for SharedSignal {
    fn current_volume(&self) -> f64 {
        f64::from_bits(self.inner.volume.load(Ordering::Relaxed))
    }

    fn current_pitch(&self) -> f64 {
        f64::from_bits(self.inner.pitch.load(Ordering::Relaxed))
    }
}
