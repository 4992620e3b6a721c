//! Microphone pitch tracker via cpal.
//!
//! The audio callback only buffers raw samples. Analysis happens on the
//! capture thread in [`MicSignalSource::refresh`], which publishes the RMS
//! volume and the McLeod pitch of the most recent window.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::PitchDetector;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info};

use super::SharedSignal;
use crate::config::SignalConfig;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("no input device available for pitch capture")]
    NoInputDevice,
    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

pub struct MicSignalSource {
    stream: Option<cpal::Stream>,
    pending: Arc<Mutex<Vec<f32>>>,
    window: Vec<f32>,
    analyser: WindowAnalyser,
    signal: SharedSignal,
}

impl MicSignalSource {
    /// Open the default input device and start buffering mono samples.
    pub fn start(config: &SignalConfig, signal: SharedSignal) -> Result<Self, SignalError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(SignalError::NoInputDevice)?;

        info!(
            "Pitch capture using device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let pending = Arc::new(Mutex::new(Vec::new()));
        let pending_clone = pending.clone();
        let err_fn = |err| error!("Pitch capture stream error: {}", err);

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut pending) = pending_clone.lock() {
                    pending.extend_from_slice(data);
                }
            },
            err_fn,
            None,
        )?;
        stream.play()?;

        Ok(Self {
            stream: Some(stream),
            pending,
            window: Vec::with_capacity(config.window_size * 2),
            analyser: WindowAnalyser::new(config),
            signal,
        })
    }

    /// Fold newly captured audio into the analysis window and publish fresh
    /// readings once a full window is available.
    pub fn refresh(&mut self) {
        let fresh = self
            .pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default();
        if fresh.is_empty() {
            return;
        }

        self.window.extend_from_slice(&fresh);
        let size = self.analyser.window_size;
        if self.window.len() > size {
            let excess = self.window.len() - size;
            self.window.drain(..excess);
        }
        if self.window.len() < size {
            return;
        }

        let reading = self.analyser.analyse(&self.window);
        self.signal.publish_volume(reading.volume);
        if let Some(pitch) = reading.pitch {
            self.signal.publish_pitch(pitch);
        }
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Stopping pitch capture stream");
            drop(stream);
        }
    }
}

impl Drop for MicSignalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReading {
    pub volume: f64,
    /// `None` when the window has no clear fundamental.
    pub pitch: Option<f64>,
}

/// Volume and pitch estimation over fixed-size windows.
pub struct WindowAnalyser {
    detector: McLeodDetector<f32>,
    window_size: usize,
    sample_rate: usize,
    power_threshold: f32,
    clarity_threshold: f32,
}

impl WindowAnalyser {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            detector: McLeodDetector::new(config.window_size, config.window_size / 2),
            window_size: config.window_size,
            sample_rate: config.sample_rate as usize,
            power_threshold: config.power_threshold,
            clarity_threshold: config.clarity_threshold,
        }
    }

    /// `window` must hold exactly `window_size` samples.
    pub fn analyse(&mut self, window: &[f32]) -> WindowReading {
        let volume = rms(window).clamp(0.0, 1.0);
        let pitch = self
            .detector
            .get_pitch(
                window,
                self.sample_rate,
                self.power_threshold,
                self.clarity_threshold,
            )
            .map(|pitch| pitch.frequency as f64);

        WindowReading { volume, pitch }
    }
}

fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, config: &SignalConfig) -> Vec<f32> {
        let dt = 1.0 / config.sample_rate as f32;
        (0..config.window_size)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 * dt).sin())
            .collect()
    }

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0; 64]), 0.0);
    }

    #[test]
    fn test_analyse_sine() {
        let config = SignalConfig::default();
        let mut analyser = WindowAnalyser::new(&config);

        let reading = analyser.analyse(&sine(220.0, 0.5, &config));

        assert!((reading.volume - 0.5 / 2f64.sqrt()).abs() < 0.01);
        let pitch = reading.pitch.unwrap();
        assert!((pitch - 220.0).abs() < 5.0, "detected {pitch}");
    }

    #[test]
    fn test_analyse_silence_has_no_pitch() {
        let config = SignalConfig::default();
        let mut analyser = WindowAnalyser::new(&config);

        let reading = analyser.analyse(&vec![0.0; config.window_size]);
        assert_eq!(reading.volume, 0.0);
        assert!(reading.pitch.is_none());
    }
}
