//! Freehand stroke entity.

use crate::geometry::{Bounds, Point, Vec2, distance_to_segment};
use crate::render::Surface;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Globally unique stroke identifier, assigned by the authoring client.
pub type StrokeId = String;

/// Stroke validation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrokeError {
    #[error("Stroke thickness must be positive, got {0}")]
    NonPositiveThickness(f64),
    #[error("Point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },
    #[error("Layer {layer} is out of range (max layers: {max_layers})")]
    LayerOutOfRange { layer: usize, max_layers: usize },
}

/// Wire form of a stroke: `{id, thickness, color, layer, points: [[x, y], ...]}`.
///
/// Bounds are never part of the wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokePayload {
    pub id: StrokeId,
    pub thickness: f64,
    pub color: String,
    pub layer: usize,
    pub points: Vec<[f64; 2]>,
}

/// One continuous freehand line authored by one participant.
///
/// Points are appended while the author is drawing. [`Stroke::simplify`] runs
/// once on release and seals the stroke; strokes built from a payload are
/// sealed from the start.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    id: StrokeId,
    thickness: f64,
    color: String,
    layer: usize,
    points: Vec<Point>,
    bounds: Option<Bounds>,
    sealed: bool,
}

impl Stroke {
    /// Create an empty stroke with an explicit id.
    pub fn new(id: impl Into<StrokeId>, thickness: f64, color: impl Into<String>, layer: usize) -> Self {
        Self {
            id: id.into(),
            thickness,
            color: color.into(),
            layer,
            points: Vec::new(),
            bounds: None,
            sealed: false,
        }
    }

    /// Create an empty stroke with a fresh random id.
    pub fn with_new_id(thickness: f64, color: impl Into<String>, layer: usize) -> Self {
        Self::new(Uuid::new_v4().to_string(), thickness, color, layer)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box, padded by the thickness. `None` until computed.
    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Whether the stroke is immutable (simplified or received finished).
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Fewer than two points have no renderable geometry.
    pub fn is_renderable(&self) -> bool {
        self.points.len() >= 2
    }

    /// Append a sample while drawing.
    pub fn append_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Check the layer against the registry's layer count.
    pub fn check_layer(&self, max_layers: usize) -> Result<(), StrokeError> {
        if self.layer < max_layers {
            Ok(())
        } else {
            Err(StrokeError::LayerOutOfRange { layer: self.layer, max_layers })
        }
    }

    /// One-shot cleanup run when the author releases the pointer.
    ///
    /// Drops every point closer than `epsilon` to the last point kept, then
    /// optionally replaces each interior point with the mean of itself and up
    /// to `smoothing_radius` neighbours on each side. The first and last
    /// points are never moved. The bounding box is rebuilt
    /// from the final points and padded by the thickness.
    ///
    /// Returns `false` without touching anything if the stroke is already sealed.
    pub fn simplify(&mut self, epsilon: f64, smoothing_radius: usize, smoothing: bool) -> bool {
        if self.sealed {
            return false;
        }
        self.sealed = true;

        self.points.dedup_by(|current, kept| current.distance(*kept) < epsilon);

        let mut bounds: Option<Bounds> = None;
        let mut include = |point: Point| match bounds.as_mut() {
            Some(b) => b.expand_to_contain(point),
            None => bounds = Some(Bounds::from_point(point)),
        };

        if smoothing && smoothing_radius > 0 && self.points.len() > 2 {
            let source = self.points.clone();
            let last = source.len() - 1;
            for (i, point) in self.points.iter_mut().enumerate() {
                // Endpoints stay where the author put them.
                if i > 0 && i < last {
                    let start = i.saturating_sub(smoothing_radius);
                    let end = (i + smoothing_radius).min(last) + 1;
                    let sum = source[start..end]
                        .iter()
                        .fold(Vec2::ZERO, |acc, p| acc + p.to_vec2());
                    *point = (sum / (end - start) as f64).to_point();
                }
                include(*point);
            }
        } else {
            self.points.iter().copied().for_each(&mut include);
        }

        self.bounds = bounds.map(|mut b| {
            b.pad(self.thickness);
            b
        });
        true
    }

    /// Recompute the bounding box from the current points.
    pub fn make_bounds(&mut self) {
        self.bounds = Bounds::from_points(self.points.iter().copied()).map(|mut b| {
            b.pad(self.thickness);
            b
        });
    }

    /// Eraser collision test.
    ///
    /// Broad phase rejects points outside the bounding box (when present).
    /// Narrow phase accepts a segment when the tangent distance is below
    /// `thickness + 1` and the point is within reach of either endpoint, where
    /// reach is the segment length plus half the thickness. Near polyline
    /// corners this can report hits slightly outside the true capsule.
    pub fn hit_test(&self, point: Point) -> bool {
        if self.points.len() < 2 {
            return false;
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.contains(point) {
                return false;
            }
        }

        let threshold = self.thickness + 1.0;
        self.points.windows(2).any(|pair| {
            let (a, b) = (pair[0], pair[1]);
            let tangent = distance_to_segment(a, b, point);
            let reach = a.distance(b) + self.thickness / 2.0;
            tangent < threshold && (a.distance(point) < reach || b.distance(point) < reach)
        })
    }

    /// Draw as one polyline. Strokes without renderable geometry are skipped.
    pub fn render<S: Surface + ?Sized>(&self, surface: &mut S) {
        if !self.is_renderable() {
            return;
        }
        surface.stroke_polyline(&self.points, self.thickness, &self.color);
    }

    pub fn to_payload(&self) -> StrokePayload {
        StrokePayload {
            id: self.id.clone(),
            thickness: self.thickness,
            color: self.color.clone(),
            layer: self.layer,
            points: self.points.iter().map(|p| [p.x, p.y]).collect(),
        }
    }

    /// Rebuild a sealed stroke from its wire form.
    ///
    /// Remote in-progress strokes are rebuilt on every update, so the bounding
    /// box is only computed when `with_bounds` is set.
    pub fn from_payload(payload: StrokePayload, with_bounds: bool) -> Result<Self, StrokeError> {
        if !(payload.thickness > 0.0 && payload.thickness.is_finite()) {
            return Err(StrokeError::NonPositiveThickness(payload.thickness));
        }
        let points = payload
            .points
            .iter()
            .enumerate()
            .map(|(index, [x, y])| {
                if x.is_finite() && y.is_finite() {
                    Ok(Point::new(*x, *y))
                } else {
                    Err(StrokeError::NonFiniteCoordinate { index })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut stroke = Self {
            id: payload.id,
            thickness: payload.thickness,
            color: payload.color,
            layer: payload.layer,
            points,
            bounds: None,
            sealed: true,
        };
        if with_bounds {
            stroke.make_bounds();
        }
        Ok(stroke)
    }
}
