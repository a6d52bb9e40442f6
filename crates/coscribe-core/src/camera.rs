//! Camera module for pan/zoom transforms.

use crate::geometry::{Bounds, Point, Size, Vec2, lerp};
use kurbo::Affine;

/// Default lower zoom clamp.
pub const DEFAULT_MIN_ZOOM: f64 = 0.5;
/// Default upper zoom clamp.
pub const DEFAULT_MAX_ZOOM: f64 = 2.0;

/// Camera manages the view transform for the canvas.
///
/// It carries two states. The logical position and zoom are authoritative and
/// used for every coordinate conversion done by input and hit-testing. The
/// smoothed position and zoom chase the logical ones a little each tick and
/// are only used to render.
///
/// World and screen coordinates relate as `screen = (world - position) * zoom`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Point,
    zoom: f64,
    smoothed_position: Point,
    smoothed_zoom: f64,
    /// Minimum allowed zoom level
    pub min_zoom: f64,
    /// Maximum allowed zoom level
    pub max_zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM)
    }
}

impl Camera {
    /// Create a camera at the origin with zoom 1 (clamped into range).
    pub fn new(min_zoom: f64, max_zoom: f64) -> Self {
        let zoom = 1.0_f64.clamp(min_zoom, max_zoom);
        Self {
            position: Point::ZERO,
            zoom,
            smoothed_position: Point::ZERO,
            smoothed_zoom: zoom,
            min_zoom,
            max_zoom,
        }
    }

    /// Logical position (world coordinate at the screen origin).
    pub fn position(&self) -> Point {
        self.position
    }

    /// Logical zoom.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn smoothed_position(&self) -> Point {
        self.smoothed_position
    }

    pub fn smoothed_zoom(&self) -> f64 {
        self.smoothed_zoom
    }

    /// Convert a screen point to world coordinates using the logical camera.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.position + screen_point.to_vec2() / self.zoom
    }

    /// Convert a world point to screen coordinates using the logical camera.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        ((world_point - self.position) * self.zoom).to_point()
    }

    /// Transform for drawing world geometry, built from the smoothed camera.
    pub fn render_transform(&self) -> Affine {
        Affine::scale(self.smoothed_zoom) * Affine::translate(-self.smoothed_position.to_vec2())
    }

    /// World-space rectangle visible through a surface of `size` pixels,
    /// according to the smoothed camera.
    pub fn viewport(&self, size: Size) -> Bounds {
        let far = self.smoothed_position + Vec2::new(size.width, size.height) / self.smoothed_zoom;
        Bounds::from_corners(self.smoothed_position, far)
    }

    /// Pan by a pointer delta in screen pixels. The camera moves the opposite
    /// way so that the content follows the pointer.
    pub fn pan(&mut self, screen_delta: Vec2) {
        self.position -= screen_delta / self.zoom;
    }

    /// Set the logical zoom, clamped to `[min_zoom, max_zoom]`.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    /// Add `step` to the logical zoom (clamped).
    pub fn zoom_by(&mut self, step: f64) {
        self.set_zoom(self.zoom + step);
    }

    /// Multiply the logical zoom by `factor` (clamped).
    pub fn zoom_scale(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.set_zoom(self.zoom * factor);
        }
    }

    /// Move the smoothed state a `factor` fraction of the way to the logical state.
    pub fn smooth_step(&mut self, factor: f64) {
        self.smoothed_position = self.smoothed_position.lerp(self.position, factor);
        self.smoothed_zoom = lerp(self.smoothed_zoom, self.zoom, factor);
    }

    /// Whether the smoothed state is within the given thresholds of the logical state.
    pub fn is_settled(&self, distance_threshold: f64, zoom_threshold: f64) -> bool {
        self.smoothed_position.distance(self.position) <= distance_threshold
            && (self.smoothed_zoom - self.zoom).abs() <= zoom_threshold
    }

    /// Jump the smoothed state to the logical state.
    pub fn snap(&mut self) {
        self.smoothed_position = self.position;
        self.smoothed_zoom = self.zoom;
    }
}
