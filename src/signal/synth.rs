//! Scripted hummer used by `humtrace simulate`.
//!
//! Produces a repeating pattern of silence and hums. Hum lengths and pitch
//! shapes rotate so that both finish conditions (volume drop and capture
//! window) show up within a few sessions.

use std::f64::consts::PI;
use std::time::Duration;

use super::SharedSignal;

const ATTACK_MS: f64 = 40.0;
const RELEASE_MS: f64 = 80.0;
const PEAK_VOLUME: f64 = 0.6;
const VIBRATO_HZ: f64 = 5.5;
const VIBRATO_DEPTH: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HumShape {
    Rising,
    Falling,
    Arch,
}

#[derive(Debug, Clone, Copy)]
struct Hum {
    length_ms: f64,
    shape: HumShape,
}

const PATTERN: [Hum; 3] = [
    Hum {
        length_ms: 700.0,
        shape: HumShape::Rising,
    },
    Hum {
        length_ms: 1400.0,
        shape: HumShape::Arch,
    },
    Hum {
        length_ms: 900.0,
        shape: HumShape::Falling,
    },
];

#[derive(Debug, Clone)]
pub struct HumSynth {
    gap_ms: f64,
    base_pitch: f64,
    range: f64,
}

impl Default for HumSynth {
    fn default() -> Self {
        Self {
            gap_ms: 1500.0,
            base_pitch: 196.0,
            range: 60.0,
        }
    }
}

impl HumSynth {
    /// Volume and pitch `elapsed` after the synth started.
    pub fn reading_at(&self, elapsed: Duration) -> (f64, f64) {
        let mut t = elapsed.as_secs_f64() * 1000.0;
        let cycle: f64 = PATTERN.iter().map(|h| self.gap_ms + h.length_ms).sum();
        t %= cycle;

        for hum in PATTERN {
            if t < self.gap_ms {
                return (0.0, self.base_pitch);
            }
            t -= self.gap_ms;
            if t < hum.length_ms {
                return (envelope(t, hum.length_ms), self.pitch(hum, t));
            }
            t -= hum.length_ms;
        }

        (0.0, self.base_pitch)
    }

    pub fn publish(&self, elapsed: Duration, signal: &SharedSignal) {
        let (volume, pitch) = self.reading_at(elapsed);
        signal.publish(volume, pitch);
    }

    fn pitch(&self, hum: Hum, t_ms: f64) -> f64 {
        let progress = (t_ms / hum.length_ms).clamp(0.0, 1.0);
        let contour = match hum.shape {
            HumShape::Rising => progress,
            HumShape::Falling => 1.0 - progress,
            HumShape::Arch => (PI * progress).sin(),
        };
        let vibrato = VIBRATO_DEPTH * (2.0 * PI * VIBRATO_HZ * t_ms / 1000.0).sin();
        self.base_pitch + self.range * contour + vibrato
    }
}

fn envelope(t_ms: f64, length_ms: f64) -> f64 {
    let attack = (t_ms / ATTACK_MS).min(1.0);
    let release = ((length_ms - t_ms) / RELEASE_MS).min(1.0);
    PEAK_VOLUME * attack.min(release).max(0.0)
}
