use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;

use super::args::FitCliArgs;
use crate::capture::{Sample, SessionId};
use crate::config::Config;
use crate::curve::BezierSegment;
use crate::export::samples_from_json;
use crate::render::{HostContainer, MountPosition, SessionRenderer, SvgHost};

#[derive(Debug, Serialize)]
pub struct FitOutput {
    pub tolerance: f64,
    pub sample_count: usize,
    pub segments: Vec<BezierSegment>,
}

pub fn handle_fit_command(config: &Config, args: FitCliArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read session file {:?}", args.file))?;
    let samples = samples_from_json(&content)?;

    let output = fit_samples(config, &samples, args.tolerance)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if let Some(path) = args.svg {
        let renderer = SessionRenderer::from_config(config).with_tolerance(output.tolerance);
        let mut host = SvgHost::new();
        let mut surface = host.mount(
            SessionId(1),
            MountPosition::Append,
            config.render.width,
            config.render.height,
        );
        renderer.render(&samples, surface.as_mut());
        host.write_snapshot(&path)?;
    }

    Ok(())
}

/// Project `samples` onto the configured canvas and fit them.
pub fn fit_samples(config: &Config, samples: &[Sample], tolerance: Option<f64>) -> Result<FitOutput> {
    let tolerance = tolerance.unwrap_or(config.render.tolerance);
    if !tolerance.is_finite() || tolerance < 0.0 {
        bail!("Tolerance must be a non-negative number, got {}", tolerance);
    }

    let renderer = SessionRenderer::from_config(config).with_tolerance(tolerance);
    let points = renderer.project(
        samples,
        config.render.width as f64,
        config.render.height as f64,
    );
    let segments = renderer.fitted(&points);
    info!(
        "Fitted {} samples into {} segments (tolerance {})",
        samples.len(),
        segments.len(),
        tolerance
    );

    Ok(FitOutput {
        tolerance,
        sample_count: samples.len(),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outlier_samples() -> Vec<Sample> {
        [200.0, 210.0, 400.0, 220.0, 205.0]
            .iter()
            .enumerate()
            .map(|(i, &pitch)| Sample {
                pitch,
                duration: i as f64 * 10.0,
            })
            .collect()
    }

    #[test]
    fn test_fit_samples_uses_config_tolerance() {
        let config = Config::default();
        let output = fit_samples(&config, &outlier_samples(), None).unwrap();

        assert_eq!(output.tolerance, 1.0);
        assert_eq!(output.sample_count, 5);
        assert!(output.segments.len() >= 2);
    }

    #[test]
    fn test_fit_samples_rejects_negative_tolerance() {
        let config = Config::default();
        assert!(fit_samples(&config, &outlier_samples(), Some(-1.0)).is_err());
    }

    #[test]
    fn test_handle_fit_command_writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("session.json");
        let svg = dir.path().join("fit.svg");
        std::fs::write(&input, "[[0, 200], [10, 210], [20, 400], [30, 220], [40, 205]]").unwrap();

        handle_fit_command(
            &Config::default(),
            FitCliArgs {
                file: input,
                tolerance: Some(50.0),
                svg: Some(svg.clone()),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(svg).unwrap();
        assert!(content.contains("<path"));
        assert!(content.contains("<line"));
    }
}
