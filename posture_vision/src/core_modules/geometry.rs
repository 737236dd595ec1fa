// THEORY:
// The `geometry` module is the stateless math toolkit every higher layer leans on.
// It knows nothing about bodies, masks or posture; it only knows points, vectors,
// angles and rays in 2D pixel space.
//
// Key architectural principles:
// 1.  **Total Functions**: Nothing here panics or returns an error. Degenerate
//     inputs (zero-length vectors, parallel ray/edge pairs) map to `None`, and the
//     caller decides what the defined fallback is.
// 2.  **One Epsilon**: Every "is this zero?" question uses `EPSILON` so the whole
//     engine agrees on what degenerate means.

use std::ops::{Add, Mul, Sub};

/// Threshold below which norms, cross products and denominators count as zero.
pub const EPSILON: f64 = 1e-6;

/// A point or vector in 2D pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Point2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product of the two vectors.
    pub fn cross(self, other: Point2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Point2) -> f64 {
        (self - other).norm()
    }

    pub fn normalized(self) -> Option<Point2> {
        let norm = self.norm();
        if norm < EPSILON {
            return None;
        }
        Some(self * (1.0 / norm))
    }

    /// Rotates the vector by +90 degrees: (x, y) -> (-y, x).
    pub fn perpendicular(self) -> Point2 {
        Point2::new(-self.y, self.x)
    }

    pub fn midpoint(self, other: Point2) -> Point2 {
        midpoint(self, other)
    }
}

impl Add for Point2 {
    type Output = Point2;

    fn add(self, rhs: Point2) -> Point2 {
        Point2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2 {
    type Output = Point2;

    fn sub(self, rhs: Point2) -> Point2 {
        Point2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2 {
    type Output = Point2;

    fn mul(self, rhs: f64) -> Point2 {
        Point2::new(self.x * rhs, self.y * rhs)
    }
}

pub fn midpoint(a: Point2, b: Point2) -> Point2 {
    Point2::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Angle in degrees at `vertex` between the arms towards `p1` and `p3`.
///
/// Returns `None` when either arm is shorter than `EPSILON`. The cosine is
/// clamped into [-1, 1] before `acos` so rounding overshoot never yields NaN.
pub fn angle_at_vertex(p1: Point2, vertex: Point2, p3: Point2) -> Option<f64> {
    let v1 = p1 - vertex;
    let v2 = p3 - vertex;
    let n1 = v1.norm();
    let n2 = v2.norm();
    if n1 < EPSILON || n2 < EPSILON {
        return None;
    }
    let cos_angle = (v1.dot(v2) / (n1 * n2)).clamp(-1.0, 1.0);
    Some(cos_angle.acos().to_degrees())
}

/// Where a ray crossed a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Point2,
    /// Distance along the ray in units of the direction vector, always >= 0.
    pub t: f64,
    /// Position along the segment, 0.0 at the start and 1.0 at the end.
    pub s: f64,
}

/// Intersects the ray `origin + t * dir` (t >= 0) with the segment `a..b`.
///
/// Solves `origin + t * dir = a + s * (b - a)` with 2D cross products. Near-parallel
/// pairs (|dir x edge| < EPSILON) are reported as no intersection.
pub fn ray_segment_intersection(origin: Point2, dir: Point2, a: Point2, b: Point2) -> Option<RayHit> {
    let edge = b - a;
    let denom = dir.cross(edge);
    if denom.abs() < EPSILON {
        return None;
    }
    let offset = a - origin;
    let t = offset.cross(edge) / denom;
    let s = offset.cross(dir) / denom;
    if t < 0.0 || !(0.0..=1.0).contains(&s) {
        return None;
    }
    Some(RayHit {
        point: origin + dir * t,
        t,
        s,
    })
}

/// Unsigned area of a closed polygon (shoelace formula).
pub fn polygon_area(points: &[Point2]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p, q)| p.cross(*q))
        .sum();
    twice_area.abs() / 2.0
}
