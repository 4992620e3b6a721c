use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "humtrace";

/// `$XDG_CONFIG_HOME/humtrace/config.toml`
pub fn config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join("config.toml"))
        .context("Unable to determine config directory")
}

pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| anyhow!("Unable to determine data directory"))
}

/// Default location for the SVG snapshot of all mounted capture surfaces.
pub fn snapshot_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("sessions.svg"))
}
