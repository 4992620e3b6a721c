use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub render: RenderConfig,
    pub sequencer: SequencerConfig,
    pub signal: SignalConfig,
    pub export: ExportConfig,
}

/// Thresholds and timing of a single capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Normalized volume (0-1) that moves a session from listening to recording.
    pub start_threshold: f64,
    /// Normalized volume below which a recording is considered finished.
    pub stop_threshold: f64,
    /// Logical recording length in milliseconds, accumulated from tick deltas.
    pub capture_window_ms: f64,
    /// Wall-clock cadence of the sampler.
    pub sample_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Maximum distance in pixels between a raw sample and the fitted curve.
    pub tolerance: f64,
    pub frame_interval_ms: u64,
    pub raw_color: String,
    pub fitted_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Pause between a finished session and the next listening one.
    pub next_session_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub sample_rate: u32,
    /// Number of most recent input samples analysed per refresh.
    pub window_size: usize,
    pub power_threshold: f32,
    pub clarity_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Shell command run for every finished session.
    /// Receives the session export JSON via stdin.
    pub post_command: String,
    pub post_command_timeout_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            start_threshold: 0.1,
            stop_threshold: 0.025,
            capture_window_ms: 1000.0,
            sample_interval_ms: 10,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 300,
            height: 150,
            tolerance: 1.0,
            frame_interval_ms: 16,
            raw_color: "green".to_string(),
            fitted_color: "red".to_string(),
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            next_session_delay_ms: 1000,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            window_size: 1024,
            power_threshold: 5.0,
            clarity_threshold: 0.7,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            post_command: String::new(),
            post_command_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within 0..=1, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },
    #[error("stop threshold ({stop}) must be below start threshold ({start})")]
    ThresholdOrder { start: f64, stop: f64 },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("curve tolerance must be a non-negative number, got {0}")]
    NegativeTolerance(f64),
    #[error("signal window size must hold at least 2 samples, got {0}")]
    WindowTooSmall(usize),
}

impl CaptureConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl SequencerConfig {
    pub fn next_session_delay(&self) -> Duration {
        Duration::from_millis(self.next_session_delay_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        for (name, value) in [
            ("start_threshold", capture.start_threshold),
            ("stop_threshold", capture.stop_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if capture.stop_threshold >= capture.start_threshold {
            return Err(ConfigError::ThresholdOrder {
                start: capture.start_threshold,
                stop: capture.stop_threshold,
            });
        }
        if !(capture.capture_window_ms.is_finite() && capture.capture_window_ms > 0.0) {
            return Err(ConfigError::NotPositive("capture_window_ms"));
        }
        if capture.sample_interval_ms == 0 {
            return Err(ConfigError::NotPositive("sample_interval_ms"));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::NotPositive("canvas size"));
        }
        if self.render.frame_interval_ms == 0 {
            return Err(ConfigError::NotPositive("frame_interval_ms"));
        }
        if !self.render.tolerance.is_finite() || self.render.tolerance < 0.0 {
            return Err(ConfigError::NegativeTolerance(self.render.tolerance));
        }
        if self.signal.sample_rate == 0 {
            return Err(ConfigError::NotPositive("sample_rate"));
        }
        if self.signal.window_size < 2 {
            return Err(ConfigError::WindowTooSmall(self.signal.window_size));
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
