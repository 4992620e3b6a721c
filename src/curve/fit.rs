//! Least-squares fitting of an ordered point sequence to cubic Bezier
//! segments (Schneider's method).
//!
//! Each candidate segment is seeded with chord-length parameters and the
//! tangents at its endpoints. When the worst point is too far away the
//! parameters are refined with Newton-Raphson, and if that does not help
//! the run is split at the worst point and both halves are fitted
//! recursively.

use super::{BezierSegment, Point2D};

const MAX_REPARAMETERIZE_ITERATIONS: usize = 20;

/// Fit `points` to as few cubic segments as the recursive split needs so
/// that every point lies within `tolerance` of the curve.
///
/// Fewer than two points yield no segments. The result is a pure function
/// of the input.
pub fn fit_curve(points: &[Point2D], tolerance: f64) -> Vec<BezierSegment> {
    if points.len() < 2 {
        return Vec::new();
    }

    let mut distinct: Vec<Point2D> = Vec::with_capacity(points.len());
    for &point in points {
        if distinct.last() != Some(&point) {
            distinct.push(point);
        }
    }

    if distinct.len() == 1 {
        let only = distinct[0];
        return vec![BezierSegment::line(only, only)];
    }

    let last = distinct.len() - 1;
    let left_tangent = (distinct[1] - distinct[0]).normalize();
    let right_tangent = (distinct[last - 1] - distinct[last]).normalize();
    let max_error_sq = tolerance.max(0.0).powi(2);

    let mut segments = Vec::new();
    fit_cubic(
        &distinct,
        left_tangent,
        right_tangent,
        max_error_sq,
        &mut segments,
    );
    segments
}

fn fit_cubic(
    points: &[Point2D],
    left_tangent: Point2D,
    right_tangent: Point2D,
    max_error_sq: f64,
    out: &mut Vec<BezierSegment>,
) {
    let first = points[0];
    let last = points[points.len() - 1];

    if points.len() == 2 {
        let dist = first.distance(last) / 3.0;
        out.push(BezierSegment::new(
            first,
            first + left_tangent * dist,
            last + right_tangent * dist,
            last,
        ));
        return;
    }

    let u = chord_length_parameterize(points);
    let mut bez = generate_bezier(points, &u, left_tangent, right_tangent);
    let (mut error_sq, mut split) = compute_max_error(points, &bez, &u);

    if error_sq <= max_error_sq {
        out.push(bez);
        return;
    }

    // Close misses are worth a few rounds of reparameterization first.
    if error_sq < max_error_sq * 4.0 {
        let mut u_prime = u;
        let mut prev_error_sq = error_sq;
        let mut prev_split = split;

        for _ in 0..MAX_REPARAMETERIZE_ITERATIONS {
            u_prime = reparameterize(&bez, points, &u_prime);
            bez = generate_bezier(points, &u_prime, left_tangent, right_tangent);
            (error_sq, split) = compute_max_error(points, &bez, &u_prime);

            if error_sq <= max_error_sq {
                out.push(bez);
                return;
            }
            if split == prev_split {
                let change = error_sq / prev_error_sq;
                if change > 0.9999 && change < 1.0001 {
                    break;
                }
            }
            prev_error_sq = error_sq;
            prev_split = split;
        }
    }

    let mut center = points[split - 1] - points[split + 1];
    if center == Point2D::ZERO {
        center = (points[split - 1] - points[split]).perpendicular();
    }
    let to_center = center.normalize();

    fit_cubic(&points[..=split], left_tangent, to_center, max_error_sq, out);
    fit_cubic(&points[split..], -to_center, right_tangent, max_error_sq, out);
}

/// Least-squares placement of the two inner control points along the
/// endpoint tangents.
fn generate_bezier(
    points: &[Point2D],
    params: &[f64],
    left_tangent: Point2D,
    right_tangent: Point2D,
) -> BezierSegment {
    let first = points[0];
    let last = points[points.len() - 1];
    let endpoints_only = BezierSegment::line(first, last);

    let mut c = [[0.0_f64; 2]; 2];
    let mut x = [0.0_f64; 2];

    for (&point, &u) in points.iter().zip(params) {
        let mu = 1.0 - u;
        let a0 = left_tangent * (3.0 * u * mu * mu);
        let a1 = right_tangent * (3.0 * mu * u * u);

        c[0][0] += a0.dot(a0);
        c[0][1] += a0.dot(a1);
        c[1][1] += a1.dot(a1);

        let tmp = point - endpoints_only.point_at(u);
        x[0] += a0.dot(tmp);
        x[1] += a1.dot(tmp);
    }
    c[1][0] = c[0][1];

    let det_c0_c1 = c[0][0] * c[1][1] - c[1][0] * c[0][1];
    let det_c0_x = c[0][0] * x[1] - c[1][0] * x[0];
    let det_x_c1 = x[0] * c[1][1] - x[1] * c[0][1];

    let (alpha_l, alpha_r) = if det_c0_c1 == 0.0 {
        (0.0, 0.0)
    } else {
        (det_x_c1 / det_c0_c1, det_c0_x / det_c0_c1)
    };

    let seg_length = first.distance(last);
    let epsilon = 1.0e-6 * seg_length;

    // A degenerate solve falls back to the Wu/Barsky heuristic; with a zero
    // tangent this collapses to a straight line.
    if alpha_l < epsilon || alpha_r < epsilon {
        let dist = seg_length / 3.0;
        return BezierSegment::new(
            first,
            first + left_tangent * dist,
            last + right_tangent * dist,
            last,
        );
    }

    BezierSegment::new(
        first,
        first + left_tangent * alpha_l,
        last + right_tangent * alpha_r,
        last,
    )
}

fn chord_length_parameterize(points: &[Point2D]) -> Vec<f64> {
    let mut u = Vec::with_capacity(points.len());
    let mut total = 0.0;
    u.push(0.0);
    for pair in points.windows(2) {
        total += pair[0].distance(pair[1]);
        u.push(total);
    }
    if total > 0.0 {
        for value in &mut u {
            *value /= total;
        }
    }
    u
}

fn reparameterize(bez: &BezierSegment, points: &[Point2D], params: &[f64]) -> Vec<f64> {
    points
        .iter()
        .zip(params)
        .map(|(&point, &u)| newton_raphson_root_find(bez, point, u))
        .collect()
}

/// One Newton step towards the parameter of the point on `bez` closest to
/// `point`, kept inside the segment.
fn newton_raphson_root_find(bez: &BezierSegment, point: Point2D, u: f64) -> f64 {
    let d = bez.point_at(u) - point;
    let q1 = bez.derivative_at(u);
    let q2 = bez.second_derivative_at(u);

    let numerator = d.dot(q1);
    let denominator = q1.length_squared() + d.dot(q2);

    if denominator == 0.0 || !denominator.is_finite() {
        return u;
    }
    (u - numerator / denominator).clamp(0.0, 1.0)
}

/// Largest squared distance between a point and its parameter's position on
/// `bez`, plus the interior index where it happens.
fn compute_max_error(points: &[Point2D], bez: &BezierSegment, params: &[f64]) -> (f64, usize) {
    let mut max_dist = 0.0;
    let mut split = points.len() / 2;

    for (i, (&point, &u)) in points.iter().zip(params).enumerate() {
        let dist = (bez.point_at(u) - point).length_squared();
        if dist > max_dist {
            max_dist = dist;
            split = i;
        }
    }

    (max_dist, split.clamp(1, points.len() - 2))
}
