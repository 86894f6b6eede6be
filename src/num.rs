//! Numeric oracle layer
//!
//! Floating-point geometry used to *guide* the symbolic engine: tolerance
//! tests, directions, lines and circles through concrete coordinates. Nothing
//! in here certifies a fact — a numeric hit only suggests an equation that the
//! elimination cores then accept or reject exactly.
//!
//! ## Conventions
//! - Directions are measured in **half-turns**: a full turn is 2, and a
//!   directed-line angle is a value mod 1. A right angle is ½.
//! - All comparisons go through [`ATOM`]; callers never compare raw floats.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

/// Tolerance below which two numeric quantities are considered identical.
pub const ATOM: f64 = 1e-6;

/// A concrete 2-D coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumPoint {
    pub x: f64,
    pub y: f64,
}

impl NumPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two coordinates.
#[inline]
pub fn distance(p: NumPoint, q: NumPoint) -> f64 {
    ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt()
}

/// Whether two coordinates coincide up to [`ATOM`].
#[inline]
pub fn close(p: NumPoint, q: NumPoint) -> bool {
    distance(p, q) < ATOM
}

/// Reduce a value into `[0, 1)` (the half-turn circle).
#[inline]
pub fn mod1(x: f64) -> f64 {
    x.rem_euclid(1.0)
}

/// Distance from `x` to the nearest integer; the metric on the mod-1 circle.
#[inline]
pub fn dist_mod1(x: f64) -> f64 {
    let f = mod1(x);
    f.min(1.0 - f)
}

/// Direction of the line through `p` and `q`, in half-turns mod 1.
#[inline]
pub fn direction(p: NumPoint, q: NumPoint) -> f64 {
    mod1((q.y - p.y).atan2(q.x - p.x) / std::f64::consts::PI)
}

/// Orientation sign of the ordered triple `(a, b, c)`.
///
/// Returns `+1` for counter-clockwise, `-1` for clockwise, and `0` when the
/// triple is collinear up to tolerance. The degenerate band is decided by the
/// distance from `c` to the line `ab`, not by the raw cross product, so the
/// test does not depend on the triangle's scale.
pub fn orientation(a: NumPoint, b: NumPoint, c: NumPoint) -> i8 {
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    let base = distance(a, b);
    if base < ATOM || cross.abs() / base < ATOM {
        0
    } else if cross > 0.0 {
        1
    } else {
        -1
    }
}

/// Whether three coordinates are collinear up to tolerance.
#[inline]
pub fn collinear(a: NumPoint, b: NumPoint, c: NumPoint) -> bool {
    orientation(a, b, c) == 0
}

/// A numeric line, stored as an origin and a unit direction vector.
#[derive(Debug, Clone, Copy)]
pub struct NumLine {
    origin: NumPoint,
    ux: f64,
    uy: f64,
}

impl NumLine {
    /// The line through two distinct coordinates. `None` when they coincide.
    pub fn through(p: NumPoint, q: NumPoint) -> Option<Self> {
        let len = distance(p, q);
        if len < ATOM {
            return None;
        }
        Some(Self {
            origin: p,
            ux: (q.x - p.x) / len,
            uy: (q.y - p.y) / len,
        })
    }

    /// Direction in half-turns mod 1.
    pub fn direction(&self) -> f64 {
        mod1(self.uy.atan2(self.ux) / std::f64::consts::PI)
    }

    /// Signed position of `p` along the line (projection onto the direction).
    pub fn position(&self, p: NumPoint) -> f64 {
        (p.x - self.origin.x) * self.ux + (p.y - self.origin.y) * self.uy
    }

    /// Distance from `p` to the line.
    pub fn distance(&self, p: NumPoint) -> f64 {
        ((p.x - self.origin.x) * self.uy - (p.y - self.origin.y) * self.ux).abs()
    }
}

/// A numeric circle.
#[derive(Debug, Clone, Copy)]
pub struct NumCircle {
    pub center: NumPoint,
    pub radius: f64,
}

impl NumCircle {
    pub fn new(center: NumPoint, radius: f64) -> Self {
        Self { center, radius }
    }

    /// The circle through three coordinates. `None` when they are collinear
    /// or not pairwise distinct.
    pub fn through(a: NumPoint, b: NumPoint, c: NumPoint) -> Option<Self> {
        if orientation(a, b, c) == 0 {
            return None;
        }
        // Intersect the perpendicular bisectors of ab and ac.
        let (abx, aby) = (b.x - a.x, b.y - a.y);
        let (acx, acy) = (c.x - a.x, c.y - a.y);
        let d = 2.0 * (abx * acy - aby * acx);
        let ab2 = abx * abx + aby * aby;
        let ac2 = acx * acx + acy * acy;
        let cx = a.x + (acy * ab2 - aby * ac2) / d;
        let cy = a.y + (abx * ac2 - acx * ab2) / d;
        let center = NumPoint::new(cx, cy);
        Some(Self {
            center,
            radius: distance(center, a),
        })
    }

    /// Distance from `p` to the circle (radial residual).
    pub fn distance(&self, p: NumPoint) -> f64 {
        (distance(self.center, p) - self.radius).abs()
    }

    /// Direction of the tangent line at a point on (or near) the circle,
    /// in half-turns mod 1: the radius direction turned by a right angle.
    pub fn tangent_direction(&self, p: NumPoint) -> f64 {
        mod1(direction(self.center, p) + 0.5)
    }
}
