//! What leaves the capture core when a session finishes.
//!
//! A [`SessionExport`] is the serialisable form of a finished buffer. Hooks
//! receive it once per session; the `fit` command reads it back.

pub mod hooks;

pub use hooks::{hook_env, LogHook, SessionHook, ShellCommandHook};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::{FinishReason, Sample, SessionReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: u64,
    pub reason: FinishReason,
    pub finished_at: DateTime<Utc>,
    /// `[duration_ms, pitch]` pairs in capture order.
    pub samples: Vec<(f64, f64)>,
}

impl SessionExport {
    pub fn from_report(report: &SessionReport) -> Self {
        Self {
            session_id: report.session_id.0,
            reason: report.reason,
            finished_at: Utc::now(),
            samples: report
                .samples
                .iter()
                .map(|s| (s.duration, s.pitch))
                .collect(),
        }
    }

    pub fn to_samples(&self) -> Vec<Sample> {
        self.samples
            .iter()
            .map(|&(duration, pitch)| Sample { pitch, duration })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize session export")
    }
}

/// Parse samples from either a full export or a bare `[[duration, pitch], ...]`
/// array.
pub fn samples_from_json(content: &str) -> Result<Vec<Sample>> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("Session file is not valid JSON")?;

    if value.is_object() {
        let export: SessionExport =
            serde_json::from_value(value).context("Malformed session export")?;
        return Ok(export.to_samples());
    }
    if value.is_array() {
        let pairs: Vec<(f64, f64)> =
            serde_json::from_value(value).context("Expected [duration, pitch] pairs")?;
        return Ok(pairs
            .into_iter()
            .map(|(duration, pitch)| Sample { pitch, duration })
            .collect());
    }

    bail!("Session file must be an export object or an array of [duration, pitch] pairs")
}
