//! Session hooks run after every finished capture.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::SessionExport;

/// Environment variable names for session metadata passed to hooks.
pub mod hook_env {
    pub const SESSION_ID: &str = "HUMTRACE_SESSION_ID";
    pub const FINISH_REASON: &str = "HUMTRACE_FINISH_REASON";
    pub const SAMPLE_COUNT: &str = "HUMTRACE_SAMPLE_COUNT";
}

#[async_trait]
pub trait SessionHook: Send + Sync {
    async fn execute(&self, export: &SessionExport) -> Result<()>;
}

/// Logs each finished session and prints its export as one JSON line.
pub struct LogHook;

#[async_trait]
impl SessionHook for LogHook {
    async fn execute(&self, export: &SessionExport) -> Result<()> {
        info!(
            "Session #{} captured {} samples ({})",
            export.session_id,
            export.samples.len(),
            export.reason.as_str()
        );
        println!("{}", export.to_json()?);
        Ok(())
    }
}

/// Pipes the export JSON into a shell command.
/// - Session metadata is set in the environment
/// - The process is killed on timeout
/// - A non-zero exit only logs a warning
pub struct ShellCommandHook {
    command: String,
    timeout: Duration,
}

impl ShellCommandHook {
    pub fn new(command: String, timeout_seconds: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl SessionHook for ShellCommandHook {
    async fn execute(&self, export: &SessionExport) -> Result<()> {
        info!(
            "Running session hook for session #{}: {}",
            export.session_id, self.command
        );
        let payload = export.to_json()?;

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env(hook_env::SESSION_ID, export.session_id.to_string())
            .env(hook_env::FINISH_REASON, export.reason.as_str())
            .env(hook_env::SAMPLE_COUNT, export.samples.len().to_string())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                warn!(
                    "Session hook for session #{} did not receive its export: {}",
                    export.session_id, e
                );
            }
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !stdout.is_empty() {
                    info!("Session hook stdout: {}", stdout.trim());
                }
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    "Session hook exited with status {}: {}",
                    output.status,
                    stderr.trim()
                );
            }
            Ok(Err(e)) => {
                warn!("Session hook failed to execute: {}", e);
            }
            Err(_) => {
                warn!(
                    "Session hook timed out after {}s (process will be killed)",
                    self.timeout.as_secs()
                );
            }
        }

        Ok(())
    }
}
