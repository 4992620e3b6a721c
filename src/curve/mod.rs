//! Plane geometry shared by the fitter and the renderer.
//!
//! Points live in canvas space: x grows to the right, y grows downwards.

pub mod fit;

pub use fit::fit_curve;

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ZERO: Point2D = Point2D { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Point2D) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Point2D) -> f64 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or the zero vector when there is
    /// no direction to keep.
    pub fn normalize(self) -> Point2D {
        let len = self.length();
        if len == 0.0 {
            Point2D::ZERO
        } else {
            Point2D::new(self.x / len, self.y / len)
        }
    }

    /// Quarter turn, same length.
    pub fn perpendicular(self) -> Point2D {
        Point2D::new(-self.y, self.x)
    }
}

impl Add for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Point2D;

    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2D {
    type Output = Point2D;

    fn mul(self, rhs: f64) -> Point2D {
        Point2D::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point2D {
    type Output = Point2D;

    fn neg(self) -> Point2D {
        Point2D::new(-self.x, -self.y)
    }
}

/// One cubic Bezier segment. Consecutive segments of a fitted curve share
/// `p3`/`p0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierSegment {
    pub p0: Point2D,
    pub p1: Point2D,
    pub p2: Point2D,
    pub p3: Point2D,
}

impl BezierSegment {
    pub fn new(p0: Point2D, p1: Point2D, p2: Point2D, p3: Point2D) -> Self {
        Self { p0, p1, p2, p3 }
    }

    /// Segment whose control points sit on the endpoints: a straight line.
    pub fn line(from: Point2D, to: Point2D) -> Self {
        Self::new(from, from, to, to)
    }

    pub fn point_at(&self, t: f64) -> Point2D {
        let mt = 1.0 - t;
        self.p0 * (mt * mt * mt)
            + self.p1 * (3.0 * mt * mt * t)
            + self.p2 * (3.0 * mt * t * t)
            + self.p3 * (t * t * t)
    }

    /// First derivative with respect to `t`.
    pub fn derivative_at(&self, t: f64) -> Point2D {
        let mt = 1.0 - t;
        (self.p1 - self.p0) * (3.0 * mt * mt)
            + (self.p2 - self.p1) * (6.0 * mt * t)
            + (self.p3 - self.p2) * (3.0 * t * t)
    }

    pub fn second_derivative_at(&self, t: f64) -> Point2D {
        (self.p2 - self.p1 * 2.0 + self.p0) * (6.0 * (1.0 - t))
            + (self.p3 - self.p2 * 2.0 + self.p1) * (6.0 * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zero_vector_stays_zero() {
        assert_eq!(Point2D::ZERO.normalize(), Point2D::ZERO);
        let unit = Point2D::new(3.0, 4.0).normalize();
        assert!((unit.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_segment_endpoints() {
        let seg = BezierSegment::new(
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 2.0),
            Point2D::new(3.0, 2.0),
            Point2D::new(4.0, 0.0),
        );
        assert_eq!(seg.point_at(0.0), seg.p0);
        assert_eq!(seg.point_at(1.0), seg.p3);
        assert_eq!(seg.derivative_at(0.0), Point2D::new(3.0, 6.0));
    }

    #[test]
    fn test_line_segment_is_straight() {
        let seg = BezierSegment::line(Point2D::new(0.0, 0.0), Point2D::new(10.0, 5.0));
        let mid = seg.point_at(0.5);
        assert!((mid.x - 5.0).abs() < 1e-12);
        assert!((mid.y - 2.5).abs() < 1e-12);
    }
}
