//! Layered stroke registry.
//!
//! Each layer keeps finished strokes in a committed map (keyed by stroke id,
//! drawn in arrival order) and live previews in an in-progress map (keyed by
//! author id, one active stroke per author). Every mutation raises the dirty
//! flag of the surface that shows it.

use crate::geometry::Point;
use crate::stroke::{Stroke, StrokeError, StrokeId};
use std::collections::HashMap;

/// Identifier of a participant (local or remote).
pub type AuthorId = String;

/// Which render surfaces are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFlags {
    /// Committed strokes changed (or the view moved).
    pub static_dirty: bool,
    /// In-progress strokes changed (or the view moved).
    pub dynamic_dirty: bool,
}

impl Default for DirtyFlags {
    fn default() -> Self {
        Self {
            static_dirty: true,
            dynamic_dirty: true,
        }
    }
}

impl DirtyFlags {
    pub fn mark_all(&mut self) {
        self.static_dirty = true;
        self.dynamic_dirty = true;
    }

    pub fn any(&self) -> bool {
        self.static_dirty || self.dynamic_dirty
    }
}

#[derive(Debug, Clone, Default)]
struct Layer {
    committed: HashMap<StrokeId, Stroke>,
    /// Draw order of committed strokes (back to front).
    order: Vec<StrokeId>,
    in_progress: HashMap<AuthorId, Stroke>,
}

impl Layer {
    fn remove_committed(&mut self, id: &str) -> Option<Stroke> {
        let removed = self.committed.remove(id)?;
        self.order.retain(|other| other != id);
        Some(removed)
    }
}

/// Per-layer committed and in-progress strokes.
#[derive(Debug, Clone)]
pub struct Registry {
    layers: Vec<Layer>,
    dirty: DirtyFlags,
}

impl Registry {
    /// Create a registry with `max_layers` empty layers (at least one).
    pub fn new(max_layers: usize) -> Self {
        Self {
            layers: vec![Layer::default(); max_layers.max(1)],
            dirty: DirtyFlags::default(),
        }
    }

    pub fn max_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn dirty_mut(&mut self) -> &mut DirtyFlags {
        &mut self.dirty
    }

    /// Committed strokes of a layer in draw order. Empty for unknown layers.
    pub fn committed(&self, layer: usize) -> impl Iterator<Item = &Stroke> {
        self.layers
            .get(layer)
            .into_iter()
            .flat_map(|l| l.order.iter().filter_map(move |id| l.committed.get(id)))
    }

    /// In-progress strokes of a layer with their authors. Empty for unknown layers.
    pub fn in_progress(&self, layer: usize) -> impl Iterator<Item = (&AuthorId, &Stroke)> {
        self.layers.get(layer).into_iter().flat_map(|l| l.in_progress.iter())
    }

    /// Find a committed stroke in any layer.
    pub fn get_committed(&self, id: &str) -> Option<&Stroke> {
        self.layers.iter().find_map(|l| l.committed.get(id))
    }

    pub fn contains_committed(&self, id: &str) -> bool {
        self.get_committed(id).is_some()
    }

    /// The author's in-progress stroke, whatever layer it is on.
    pub fn get_in_progress(&self, author: &str) -> Option<&Stroke> {
        self.layers.iter().find_map(|l| l.in_progress.get(author))
    }

    pub fn committed_len(&self) -> usize {
        self.layers.iter().map(|l| l.committed.len()).sum()
    }

    pub fn in_progress_len(&self) -> usize {
        self.layers.iter().map(|l| l.in_progress.len()).sum()
    }

    /// Insert or replace a committed stroke. Replacing keeps the original
    /// draw position, so a duplicate commit is a no-op for rendering order.
    pub fn insert_committed(&mut self, stroke: Stroke) -> Result<(), StrokeError> {
        stroke.check_layer(self.max_layers())?;
        let layer = &mut self.layers[stroke.layer()];
        if !layer.committed.contains_key(stroke.id()) {
            layer.order.push(stroke.id().to_string());
        }
        layer.committed.insert(stroke.id().to_string(), stroke);
        self.dirty.static_dirty = true;
        Ok(())
    }

    /// Remove a committed stroke from every layer. Absent ids are a no-op.
    pub fn remove_committed(&mut self, id: &str) -> Option<Stroke> {
        let mut removed = None;
        for layer in &mut self.layers {
            if let Some(stroke) = layer.remove_committed(id) {
                removed = Some(stroke);
            }
        }
        if removed.is_some() {
            self.dirty.static_dirty = true;
        }
        removed
    }

    /// Insert or replace the author's in-progress stroke. Any entry the author
    /// still has on another layer is dropped.
    pub fn upsert_in_progress(&mut self, author: &str, stroke: Stroke) -> Result<(), StrokeError> {
        stroke.check_layer(self.max_layers())?;
        let target = stroke.layer();
        for (index, layer) in self.layers.iter_mut().enumerate() {
            if index != target {
                layer.in_progress.remove(author);
            }
        }
        self.layers[target].in_progress.insert(author.to_string(), stroke);
        self.dirty.dynamic_dirty = true;
        Ok(())
    }

    /// Mutable access to the author's in-progress stroke on `layer`.
    pub fn in_progress_mut(&mut self, layer: usize, author: &str) -> Option<&mut Stroke> {
        let stroke = self.layers.get_mut(layer)?.in_progress.get_mut(author)?;
        self.dirty.dynamic_dirty = true;
        Some(stroke)
    }

    /// Remove and return the author's in-progress stroke on `layer`.
    pub fn take_in_progress(&mut self, layer: usize, author: &str) -> Option<Stroke> {
        let stroke = self.layers.get_mut(layer)?.in_progress.remove(author)?;
        self.dirty.dynamic_dirty = true;
        Some(stroke)
    }

    /// Drop the author's in-progress stroke from every layer.
    pub fn remove_in_progress_author(&mut self, author: &str) -> bool {
        let mut removed = false;
        for layer in &mut self.layers {
            removed |= layer.in_progress.remove(author).is_some();
        }
        if removed {
            self.dirty.dynamic_dirty = true;
        }
        removed
    }

    /// Drop every in-progress entry showing stroke `id`, whoever authored it.
    pub fn remove_in_progress_stroke(&mut self, id: &str) -> usize {
        let mut removed = 0;
        for layer in &mut self.layers {
            let before = layer.in_progress.len();
            layer.in_progress.retain(|_, stroke| stroke.id() != id);
            removed += before - layer.in_progress.len();
        }
        if removed > 0 {
            self.dirty.dynamic_dirty = true;
        }
        removed
    }

    /// Ids of every committed stroke, on any layer, that collides with `point`.
    pub fn committed_hits(&self, point: Point) -> Vec<StrokeId> {
        self.layers
            .iter()
            .flat_map(|l| l.order.iter().filter_map(move |id| l.committed.get(id)))
            .filter(|stroke| stroke.hit_test(point))
            .map(|stroke| stroke.id().to_string())
            .collect()
    }
}
