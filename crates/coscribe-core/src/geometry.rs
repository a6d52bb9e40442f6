//! Geometry kernel: vectors, axis-aligned bounds and point/line distances.
//!
//! Points and vectors come straight from kurbo. Everything else in the crate
//! works in world coordinates unless a name says otherwise.

pub use kurbo::{Point, Size, Vec2};
use thiserror::Error;

/// Geometry errors.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("zero-length segment: both endpoints are ({0}, {1})")]
    ZeroLengthSegment(f64, f64),
}

/// Linear interpolation between two scalars.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

pub fn midpoint(a: Point, b: Point) -> Point {
    a.midpoint(b)
}

/// Perpendicular distance from `p` to the infinite line through `a` and `b`.
///
/// Uses twice the area of the triangle `(a, b, p)` divided by the base length.
/// Fails when `a == b` since the line is undefined.
pub fn distance_to_line(a: Point, b: Point, p: Point) -> Result<f64, GeometryError> {
    let base = a.distance(b);
    if base < f64::EPSILON {
        return Err(GeometryError::ZeroLengthSegment(a.x, a.y));
    }

    let area2 = ((b.y - a.y) * p.x - (b.x - a.x) * p.y + b.x * a.y - b.y * a.x).abs();
    Ok(area2 / base)
}

/// Tangent distance used by stroke hit-testing.
///
/// Same as [`distance_to_line`], except a degenerate segment falls back to the
/// plain distance between `p` and the collapsed endpoint.
pub fn distance_to_segment(a: Point, b: Point, p: Point) -> f64 {
    distance_to_line(a, b, p).unwrap_or_else(|_| a.distance(p))
}

/// Axis-aligned bounding box with inclusive edges.
///
/// `min` is never greater than `max` on either axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    min: Point,
    max: Point,
}

impl Bounds {
    /// A zero-area box sitting on a single point.
    pub fn from_point(point: Point) -> Self {
        Self { min: point, max: point }
    }

    /// Build from any two opposite corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut bounds = Self::from_point(iter.next()?);
        for point in iter {
            bounds.expand_to_contain(point);
        }
        Some(bounds)
    }

    pub fn min(&self) -> Point {
        self.min
    }

    pub fn max(&self) -> Point {
        self.max
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Grow in place so that `point` is inside.
    pub fn expand_to_contain(&mut self, point: Point) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    /// Push every edge outwards by `margin`. Negative margins are ignored.
    pub fn pad(&mut self, margin: f64) {
        let margin = margin.max(0.0);
        self.min = Point::new(self.min.x - margin, self.min.y - margin);
        self.max = Point::new(self.max.x + margin, self.max.y + margin);
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Whether the boxes share any point, edges included.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}
