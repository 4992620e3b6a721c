//! Fixed-cadence pitch sampler with drift correction.
//!
//! Every tick measures the real time since the previous tick and advances
//! the logical recording duration by exactly that amount, so a late timer
//! never compresses or stretches the captured curve.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::Sample;
use crate::signal::SignalSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The logical recording duration passed the capture window.
    CaptureWindowElapsed,
    /// Volume fell below the stop threshold.
    VolumeDropped,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaptureWindowElapsed => "capture_window_elapsed",
            Self::VolumeDropped => "volume_dropped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerTick {
    Continue,
    Stop(FinishReason),
}

#[derive(Debug)]
pub struct Sampler {
    samples: Vec<Sample>,
    recording_duration: f64,
    last_tick: Instant,
    capture_window_ms: f64,
    stop_threshold: f64,
    finished: Option<FinishReason>,
}

impl Sampler {
    pub fn new(baseline: Instant, capture_window_ms: f64, stop_threshold: f64) -> Self {
        Self {
            samples: Vec::with_capacity(128),
            recording_duration: 0.0,
            last_tick: baseline,
            capture_window_ms,
            stop_threshold,
            finished: None,
        }
    }

    /// Append one sample and decide whether recording is over.
    ///
    /// The sample carries the duration from *before* this tick's elapsed
    /// time is added. Once stopped, further ticks change nothing.
    pub fn tick(&mut self, now: Instant, source: &dyn SignalSource) -> SamplerTick {
        if let Some(reason) = self.finished {
            return SamplerTick::Stop(reason);
        }

        let elapsed = millis(now.saturating_duration_since(self.last_tick));
        let next_duration = self.recording_duration + elapsed;

        self.samples.push(Sample {
            pitch: source.current_pitch(),
            duration: self.recording_duration,
        });

        let reason = if next_duration > self.capture_window_ms {
            Some(FinishReason::CaptureWindowElapsed)
        } else if source.current_volume() < self.stop_threshold {
            Some(FinishReason::VolumeDropped)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.finished = Some(reason);
                SamplerTick::Stop(reason)
            }
            None => {
                self.recording_duration = next_duration;
                self.last_tick = self.last_tick.max(now);
                SamplerTick::Continue
            }
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Logical milliseconds recorded so far.
    pub fn recording_duration(&self) -> f64 {
        self.recording_duration
    }

    pub fn finished(&self) -> Option<FinishReason> {
        self.finished
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SharedSignal;

    fn loud(pitch: f64) -> SharedSignal {
        let signal = SharedSignal::new();
        signal.publish(0.5, pitch);
        signal
    }

    #[test]
    fn test_first_sample_has_zero_duration() {
        let t0 = Instant::now();
        let signal = loud(220.0);
        let mut sampler = Sampler::new(t0, 1000.0, 0.025);

        let tick = sampler.tick(t0 + Duration::from_millis(10), &signal);

        assert_eq!(tick, SamplerTick::Continue);
        assert_eq!(sampler.samples(), &[Sample { pitch: 220.0, duration: 0.0 }]);
        assert_eq!(sampler.recording_duration(), 10.0);
    }

    #[test]
    fn test_drift_correction_follows_real_gaps() {
        let t0 = Instant::now();
        let signal = loud(300.0);
        let mut sampler = Sampler::new(t0, 1000.0, 0.025);
        let gaps_ms = [10, 13, 7, 25, 9, 11];

        let mut now = t0;
        for gap in gaps_ms {
            now += Duration::from_millis(gap);
            assert_eq!(sampler.tick(now, &signal), SamplerTick::Continue);
        }

        let total: u64 = gaps_ms.iter().sum();
        assert_eq!(sampler.recording_duration(), total as f64);

        let durations: Vec<f64> = sampler.samples().iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![0.0, 10.0, 23.0, 30.0, 55.0, 64.0]);

        let deltas: Vec<f64> = durations.windows(2).map(|w| w[1] - w[0]).collect();
        let expected: Vec<f64> = gaps_ms[..gaps_ms.len() - 1].iter().map(|&g| g as f64).collect();
        assert_eq!(deltas, expected);
    }

    #[test]
    fn test_volume_drop_stops_on_the_same_tick() {
        let t0 = Instant::now();
        let signal = loud(250.0);
        let mut sampler = Sampler::new(t0, 1000.0, 0.025);

        sampler.tick(t0 + Duration::from_millis(10), &signal);
        signal.publish_volume(0.02);
        let tick = sampler.tick(t0 + Duration::from_millis(20), &signal);

        assert_eq!(tick, SamplerTick::Stop(FinishReason::VolumeDropped));
        assert_eq!(sampler.samples().len(), 2);
        // Duration is not advanced on the stopping tick.
        assert_eq!(sampler.recording_duration(), 10.0);
    }

    #[test]
    fn test_capture_window_stops_after_exceeding_limit() {
        let t0 = Instant::now();
        let signal = loud(180.0);
        let mut sampler = Sampler::new(t0, 1000.0, 0.025);

        let mut now = t0;
        for _ in 0..100 {
            now += Duration::from_millis(10);
            assert_eq!(sampler.tick(now, &signal), SamplerTick::Continue);
        }
        assert_eq!(sampler.recording_duration(), 1000.0);

        now += Duration::from_millis(10);
        assert_eq!(
            sampler.tick(now, &signal),
            SamplerTick::Stop(FinishReason::CaptureWindowElapsed)
        );
        assert_eq!(sampler.samples().len(), 101);
        assert_eq!(sampler.samples()[100].duration, 1000.0);
    }

    #[test]
    fn test_ticks_after_stop_are_ignored() {
        let t0 = Instant::now();
        let signal = loud(200.0);
        signal.publish_volume(0.0);
        let mut sampler = Sampler::new(t0, 1000.0, 0.025);

        sampler.tick(t0 + Duration::from_millis(10), &signal);
        signal.publish_volume(0.9);
        let tick = sampler.tick(t0 + Duration::from_millis(20), &signal);

        assert_eq!(tick, SamplerTick::Stop(FinishReason::VolumeDropped));
        assert_eq!(sampler.samples().len(), 1);
    }

    #[test]
    fn test_durations_never_decrease() {
        let t0 = Instant::now();
        let signal = loud(200.0);
        let mut sampler = Sampler::new(t0, 1000.0, 0.025);

        // A tick stamped before the previous one contributes no time.
        sampler.tick(t0 + Duration::from_millis(10), &signal);
        sampler.tick(t0 + Duration::from_millis(5), &signal);
        sampler.tick(t0 + Duration::from_millis(30), &signal);

        let samples = sampler.samples();
        assert!(samples.windows(2).all(|w| w[0].duration <= w[1].duration));
    }
}
