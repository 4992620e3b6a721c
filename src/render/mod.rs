//! Painting a session's samples onto its own surface.
//!
//! Every frame clears the surface, then draws the raw sample polyline and
//! the curve fitted to it. Nothing is cached between frames: the fit is
//! recomputed from the live buffer.

pub mod svg;

pub use svg::{Canvas, DrawCommand, SvgHost, SvgSurface};

use crate::capture::{Sample, SessionId};
use crate::config::Config;
use crate::curve::{fit_curve, BezierSegment, Point2D};

/// A drawable area of fixed pixel size.
pub trait Surface {
    fn width(&self) -> f64;
    fn height(&self) -> f64;
    fn clear(&mut self);
    fn stroke_line(&mut self, from: Point2D, to: Point2D, color: &str);
    fn stroke_bezier(&mut self, segment: &BezierSegment, color: &str);
}

/// Where a new surface goes relative to the ones already mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPosition {
    Append,
    Before(SessionId),
}

/// Place that displays successive session surfaces.
pub trait HostContainer {
    fn mount(
        &mut self,
        session: SessionId,
        position: MountPosition,
        width: u32,
        height: u32,
    ) -> Box<dyn Surface>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub raw_strokes: usize,
    pub fitted_segments: usize,
}

#[derive(Debug, Clone)]
pub struct SessionRenderer {
    capture_window_ms: f64,
    tolerance: f64,
    raw_color: String,
    fitted_color: String,
}

impl SessionRenderer {
    pub fn new(capture_window_ms: f64, tolerance: f64) -> Self {
        Self {
            capture_window_ms,
            tolerance,
            raw_color: "green".to_string(),
            fitted_color: "red".to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            capture_window_ms: config.capture.capture_window_ms,
            tolerance: config.render.tolerance,
            raw_color: config.render.raw_color.clone(),
            fitted_color: config.render.fitted_color.clone(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Map samples to canvas space.
    ///
    /// The pitch axis is normalized over the samples given, so the curve
    /// rescales while the buffer grows. A flat pitch range sits at
    /// mid-height.
    pub fn project(&self, samples: &[Sample], width: f64, height: f64) -> Vec<Point2D> {
        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
                (min.min(s.pitch), max.max(s.pitch))
            });
        let range = max - min;

        samples
            .iter()
            .map(|sample| {
                let x = width * (sample.duration / self.capture_window_ms);
                let y = if range > 0.0 && range.is_finite() {
                    height - ((sample.pitch - min) / range) * height
                } else {
                    height / 2.0
                };
                Point2D::new(x, y)
            })
            .collect()
    }

    pub fn fitted(&self, points: &[Point2D]) -> Vec<BezierSegment> {
        fit_curve(points, self.tolerance)
    }

    pub fn render(&self, samples: &[Sample], surface: &mut dyn Surface) -> RenderStats {
        surface.clear();

        let points = self.project(samples, surface.width(), surface.height());
        let mut stats = RenderStats::default();

        match points.as_slice() {
            [] => return stats,
            [only] => {
                surface.stroke_line(*only, *only, &self.raw_color);
                stats.raw_strokes = 1;
            }
            _ => {
                for pair in points.windows(2) {
                    surface.stroke_line(pair[0], pair[1], &self.raw_color);
                }
                stats.raw_strokes = points.len() - 1;
            }
        }

        // Fewer than two samples have no curve to fit.
        if points.len() >= 2 {
            let segments = self.fitted(&points);
            for segment in &segments {
                surface.stroke_bezier(segment, &self.fitted_color);
            }
            stats.fitted_segments = segments.len();
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(duration: f64, pitch: f64) -> Sample {
        Sample { pitch, duration }
    }

    fn surface(width: u32, height: u32) -> SvgSurface {
        SvgSurface::new(width, height)
    }

    #[test]
    fn test_project_maps_window_and_range() {
        let renderer = SessionRenderer::new(1000.0, 1.0);
        let samples = [sample(0.0, 100.0), sample(500.0, 150.0), sample(1000.0, 200.0)];

        let points = renderer.project(&samples, 300.0, 150.0);

        assert_eq!(points[0], Point2D::new(0.0, 150.0));
        assert_eq!(points[1], Point2D::new(150.0, 75.0));
        assert_eq!(points[2], Point2D::new(300.0, 0.0));
    }

    #[test]
    fn test_project_rescales_with_new_extremes() {
        let renderer = SessionRenderer::new(1000.0, 1.0);
        let mut samples = vec![sample(0.0, 100.0), sample(10.0, 200.0)];
        let before = renderer.project(&samples, 300.0, 150.0);

        samples.push(sample(20.0, 300.0));
        let after = renderer.project(&samples, 300.0, 150.0);

        assert_eq!(before[1].y, 0.0);
        assert_eq!(after[1].y, 75.0);
    }

    #[test]
    fn test_project_flat_pitch_sits_mid_height() {
        let renderer = SessionRenderer::new(1000.0, 1.0);
        let points = renderer.project(&[sample(0.0, 220.0), sample(10.0, 220.0)], 300.0, 150.0);
        assert!(points.iter().all(|p| p.y == 75.0));
    }

    #[test]
    fn test_render_empty_buffer_only_clears() {
        let renderer = SessionRenderer::new(1000.0, 1.0);
        let mut surface = surface(300, 150);

        let stats = renderer.render(&[], &mut surface);

        assert_eq!(stats, RenderStats::default());
        assert_eq!(surface.canvas().borrow().clear_count(), 1);
        assert!(surface.canvas().borrow().commands().is_empty());
    }

    #[test]
    fn test_render_single_sample_keeps_raw_trace() {
        let renderer = SessionRenderer::new(1000.0, 1.0);
        let mut surface = surface(300, 150);

        let stats = renderer.render(&[sample(0.0, 200.0)], &mut surface);

        assert_eq!(stats.raw_strokes, 1);
        assert_eq!(stats.fitted_segments, 0);
        let canvas = surface.canvas();
        let canvas = canvas.borrow();
        assert!(matches!(canvas.commands(), [DrawCommand::Line { .. }]));
    }

    #[test]
    fn test_render_draws_polyline_and_curve() {
        let renderer = SessionRenderer::new(1000.0, 1.0);
        let mut surface = surface(300, 150);
        let samples: Vec<Sample> = [200.0, 210.0, 400.0, 220.0, 205.0]
            .iter()
            .enumerate()
            .map(|(i, &pitch)| sample(i as f64 * 10.0, pitch))
            .collect();

        let stats = renderer.render(&samples, &mut surface);

        assert_eq!(stats.raw_strokes, 4);
        assert!(stats.fitted_segments >= 2);
        let canvas = surface.canvas();
        let canvas = canvas.borrow();
        let beziers = canvas
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Bezier { .. }))
            .count();
        assert_eq!(beziers, stats.fitted_segments);
    }

    #[test]
    fn test_render_repaints_from_scratch() {
        let renderer = SessionRenderer::new(1000.0, 1.0);
        let mut surface = surface(300, 150);
        let samples = [sample(0.0, 200.0), sample(10.0, 260.0)];

        renderer.render(&samples, &mut surface);
        let first = surface.canvas().borrow().commands().len();
        renderer.render(&samples, &mut surface);

        let canvas = surface.canvas();
        let canvas = canvas.borrow();
        assert_eq!(canvas.commands().len(), first);
        assert_eq!(canvas.clear_count(), 2);
    }
}
