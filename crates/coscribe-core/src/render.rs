//! Dirty-flag driven rendering onto two surfaces.
//!
//! The static surface shows committed strokes, the dynamic surface shows
//! in-progress ones. The scheduler only reads engine state; anything it finds
//! that needs evicting is reported back in [`FrameReport`].

use crate::camera::Camera;
use crate::geometry::{Point, Size};
use crate::registry::{AuthorId, Registry};
use crate::tombstone::Tombstones;
use kurbo::Affine;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    #[error("Rendering surface unavailable: {0:?}")]
    MissingSurface(SurfaceKind),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Static,
    Dynamic,
}

/// A 2D drawing target supplied by the host toolkit.
pub trait Surface {
    /// Size in device pixels.
    fn size(&self) -> Size;

    /// Clear the whole surface, ignoring the current transform.
    fn clear(&mut self);

    /// Replace the current transform.
    fn set_transform(&mut self, transform: Affine);

    /// Stroke an open polyline with round caps and joins.
    fn stroke_polyline(&mut self, points: &[Point], thickness: f64, color: &str);
}

/// Hands out the two surfaces the scheduler draws on.
pub trait SurfaceHost {
    type Surface: Surface;

    /// `None` when the toolkit cannot provide the surface.
    fn acquire(&mut self, kind: SurfaceKind) -> Option<Self::Surface>;
}

/// What happened during one [`RenderScheduler::render`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub static_drawn: usize,
    pub static_culled: usize,
    pub dynamic_drawn: usize,
    /// In-progress entries drawn this frame whose stroke id is tombstoned.
    /// The owner should evict them and render the dynamic surface once more.
    pub stale_in_progress: Vec<(usize, AuthorId)>,
}

impl FrameReport {
    pub fn render_again(&self) -> bool {
        !self.stale_in_progress.is_empty()
    }
}

pub struct RenderScheduler<S: Surface> {
    static_surface: S,
    dynamic_surface: S,
}

impl<S: Surface> RenderScheduler<S> {
    /// Acquire both surfaces. Either one missing is fatal.
    pub fn new<H: SurfaceHost<Surface = S>>(host: &mut H) -> RenderResult<Self> {
        let static_surface = host
            .acquire(SurfaceKind::Static)
            .ok_or(RenderError::MissingSurface(SurfaceKind::Static))?;
        let dynamic_surface = host
            .acquire(SurfaceKind::Dynamic)
            .ok_or(RenderError::MissingSurface(SurfaceKind::Dynamic))?;
        Ok(Self {
            static_surface,
            dynamic_surface,
        })
    }

    pub fn static_surface(&self) -> &S {
        &self.static_surface
    }

    pub fn dynamic_surface(&self) -> &S {
        &self.dynamic_surface
    }

    /// Redraw whichever surfaces the registry marks dirty.
    ///
    /// Committed strokes whose bounds miss the viewport are skipped, so the
    /// cost follows the visible stroke count rather than the total.
    pub fn render(&mut self, registry: &Registry, camera: &Camera, tombstones: &Tombstones) -> FrameReport {
        let dirty = registry.dirty();
        let mut report = FrameReport::default();
        let transform = camera.render_transform();

        if dirty.static_dirty {
            let surface = &mut self.static_surface;
            surface.clear();
            surface.set_transform(transform);
            let viewport = camera.viewport(surface.size());

            for layer in 0..registry.max_layers() {
                for stroke in registry.committed(layer) {
                    match stroke.bounds() {
                        Some(bounds) if !bounds.overlaps(&viewport) => report.static_culled += 1,
                        _ => {
                            stroke.render(surface);
                            report.static_drawn += 1;
                        }
                    }
                }
            }
        }

        if dirty.dynamic_dirty {
            let surface = &mut self.dynamic_surface;
            surface.clear();
            surface.set_transform(transform);

            for layer in 0..registry.max_layers() {
                for (author, stroke) in registry.in_progress(layer) {
                    stroke.render(surface);
                    report.dynamic_drawn += 1;
                    if tombstones.contains(stroke.id()) {
                        report.stale_in_progress.push((layer, author.clone()));
                    }
                }
            }
        }

        report
    }
}

/// One recorded surface call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    SetTransform(Affine),
    Polyline {
        points: Vec<Point>,
        thickness: f64,
        color: String,
    },
}

/// Surface that records calls instead of drawing. Used headless and in tests.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: Size,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Polylines drawn since the last clear.
    pub fn visible_polylines(&self) -> usize {
        self.commands
            .iter()
            .rev()
            .take_while(|c| **c != DrawCommand::Clear)
            .filter(|c| matches!(c, DrawCommand::Polyline { .. }))
            .count()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn set_transform(&mut self, transform: Affine) {
        self.commands.push(DrawCommand::SetTransform(transform));
    }

    fn stroke_polyline(&mut self, points: &[Point], thickness: f64, color: &str) {
        self.commands.push(DrawCommand::Polyline {
            points: points.to_vec(),
            thickness,
            color: color.to_string(),
        });
    }
}

/// Host handing out [`RecordingSurface`]s of a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct HeadlessHost {
    pub size: Size,
}

impl SurfaceHost for HeadlessHost {
    type Surface = RecordingSurface;

    fn acquire(&mut self, _kind: SurfaceKind) -> Option<RecordingSurface> {
        Some(RecordingSurface::new(self.size))
    }
}
