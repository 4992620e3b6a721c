//! In-memory canvases that serialise to SVG.
//!
//! A [`SvgHost`] keeps every mounted canvas in display order. Surfaces handed
//! out to sessions write into the same canvases, so a finished session's
//! last frame stays visible after the session is retired.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fmt::Write as _;
use std::path::Path;
use std::rc::Rc;
use tracing::{info, warn};

use super::{HostContainer, MountPosition, Surface};
use crate::capture::SessionId;
use crate::curve::{BezierSegment, Point2D};

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line {
        from: Point2D,
        to: Point2D,
        color: String,
    },
    Bezier {
        segment: BezierSegment,
        color: String,
    },
}

#[derive(Debug)]
pub struct Canvas {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
    clears: u64,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
            clears: 0,
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    /// SVG group for this canvas, shifted down by `offset_y` pixels.
    pub fn to_svg_group(&self, offset_y: u32) -> String {
        let mut out = String::new();
        let _ = writeln!(out, r#"  <g transform="translate(0,{offset_y})">"#);
        let _ = writeln!(
            out,
            r##"    <rect width="{}" height="{}" fill="none" stroke="#ccc"/>"##,
            self.width, self.height
        );
        for command in &self.commands {
            match command {
                DrawCommand::Line { from, to, color } => {
                    let _ = writeln!(
                        out,
                        r#"    <line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}"/>"#,
                        from.x, from.y, to.x, to.y, color
                    );
                }
                DrawCommand::Bezier { segment, color } => {
                    let BezierSegment { p0, p1, p2, p3 } = segment;
                    let _ = writeln!(
                        out,
                        r#"    <path d="M {:.2} {:.2} C {:.2} {:.2}, {:.2} {:.2}, {:.2} {:.2}" fill="none" stroke="{}"/>"#,
                        p0.x, p0.y, p1.x, p1.y, p2.x, p2.y, p3.x, p3.y, color
                    );
                }
            }
        }
        out.push_str("  </g>\n");
        out
    }
}

/// Drawing handle onto one host-owned canvas.
pub struct SvgSurface {
    canvas: Rc<RefCell<Canvas>>,
}

impl SvgSurface {
    /// Standalone surface, not mounted anywhere.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Rc::new(RefCell::new(Canvas::new(width, height))),
        }
    }

    pub fn canvas(&self) -> Rc<RefCell<Canvas>> {
        Rc::clone(&self.canvas)
    }
}

impl Surface for SvgSurface {
    fn width(&self) -> f64 {
        self.canvas.borrow().width as f64
    }

    fn height(&self) -> f64 {
        self.canvas.borrow().height as f64
    }

    fn clear(&mut self) {
        let mut canvas = self.canvas.borrow_mut();
        canvas.commands.clear();
        canvas.clears += 1;
    }

    fn stroke_line(&mut self, from: Point2D, to: Point2D, color: &str) {
        self.canvas.borrow_mut().commands.push(DrawCommand::Line {
            from,
            to,
            color: color.to_string(),
        });
    }

    fn stroke_bezier(&mut self, segment: &BezierSegment, color: &str) {
        self.canvas.borrow_mut().commands.push(DrawCommand::Bezier {
            segment: *segment,
            color: color.to_string(),
        });
    }
}

struct MountedCanvas {
    session: SessionId,
    canvas: Rc<RefCell<Canvas>>,
}

/// Ordered stack of session canvases, first entry shown on top.
#[derive(Clone, Default)]
pub struct SvgHost {
    mounted: Rc<RefCell<Vec<MountedCanvas>>>,
}

impl SvgHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions in display order.
    pub fn order(&self) -> Vec<SessionId> {
        self.mounted.borrow().iter().map(|m| m.session).collect()
    }

    pub fn canvas(&self, session: SessionId) -> Option<Rc<RefCell<Canvas>>> {
        self.mounted
            .borrow()
            .iter()
            .find(|m| m.session == session)
            .map(|m| Rc::clone(&m.canvas))
    }

    pub fn to_svg(&self) -> String {
        let mounted = self.mounted.borrow();
        let width = mounted
            .iter()
            .map(|m| m.canvas.borrow().width)
            .max()
            .unwrap_or(0);
        let total_height: u32 = mounted.iter().map(|m| m.canvas.borrow().height).sum();

        let mut out = String::new();
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{total_height}" viewBox="0 0 {width} {total_height}">"#
        );
        let mut offset = 0;
        for entry in mounted.iter() {
            let canvas = entry.canvas.borrow();
            out.push_str(&canvas.to_svg_group(offset));
            offset += canvas.height;
        }
        out.push_str("</svg>\n");
        out
    }

    pub fn write_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create snapshot directory")?;
        }
        std::fs::write(path, self.to_svg()).context("Failed to write SVG snapshot")?;
        info!("Wrote snapshot of {} sessions to {:?}", self.order().len(), path);
        Ok(())
    }
}

impl HostContainer for SvgHost {
    fn mount(
        &mut self,
        session: SessionId,
        position: MountPosition,
        width: u32,
        height: u32,
    ) -> Box<dyn Surface> {
        let surface = SvgSurface::new(width, height);
        let entry = MountedCanvas {
            session,
            canvas: surface.canvas(),
        };

        let mut mounted = self.mounted.borrow_mut();
        match position {
            MountPosition::Append => mounted.push(entry),
            MountPosition::Before(anchor) => {
                match mounted.iter().position(|m| m.session == anchor) {
                    Some(index) => mounted.insert(index, entry),
                    None => {
                        warn!("Mount anchor {} not found, appending {}", anchor, session);
                        mounted.push(entry);
                    }
                }
            }
        }

        Box::new(surface)
    }
}
