//! Short-lived markers for stroke ids that were just committed or deleted.
//!
//! Late in-progress updates for a marked id are discarded instead of
//! resurrecting the stroke as a live preview. The whole set is cleared on a
//! fixed period, so the guard only holds for a bounded window.

use crate::stroke::StrokeId;
use std::collections::HashMap;

/// Why an id was marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneKind {
    Committed,
    Deleted,
}

#[derive(Debug, Clone, Default)]
pub struct Tombstones {
    entries: HashMap<StrokeId, TombstoneKind>,
}

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id`. A deletion is never downgraded back to a commit.
    pub fn insert(&mut self, id: impl Into<StrokeId>, kind: TombstoneKind) {
        let entry = self.entries.entry(id.into()).or_insert(kind);
        if kind == TombstoneKind::Deleted {
            *entry = TombstoneKind::Deleted;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn kind(&self, id: &str) -> Option<TombstoneKind> {
        self.entries.get(id).copied()
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.kind(id) == Some(TombstoneKind::Deleted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
