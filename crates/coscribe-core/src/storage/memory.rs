//! In-memory stroke store.

use super::{FetchFuture, StorageError, StorageResult, StrokeStore};
use crate::stroke::{StrokeId, StrokePayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Default)]
struct Inner {
    strokes: RwLock<HashMap<StrokeId, StrokePayload>>,
    pending_adds: Mutex<Vec<StrokePayload>>,
    pending_deletes: Mutex<Vec<StrokeId>>,
}

/// What one [`MemoryStore::drain`] applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub added: usize,
    pub deleted: usize,
}

/// In-memory store for testing and ephemeral use.
///
/// Clones share the same contents, so several engines can sit on one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `strokes`.
    pub fn with_strokes(strokes: impl IntoIterator<Item = StrokePayload>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.inner.strokes.write() {
            map.extend(strokes.into_iter().map(|s| (s.id.clone(), s)));
        }
        store
    }

    /// Number of strokes written so far.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.inner.strokes.read().map_err(lock_error)?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, id: &str) -> StorageResult<StrokePayload> {
        let strokes = self.inner.strokes.read().map_err(lock_error)?;
        strokes
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Queued operations not yet applied, as `(adds, deletes)`.
    pub fn pending(&self) -> StorageResult<(usize, usize)> {
        let adds = self.inner.pending_adds.lock().map_err(lock_error)?.len();
        let deletes = self.inner.pending_deletes.lock().map_err(lock_error)?.len();
        Ok((adds, deletes))
    }

    /// Apply every queued add, then every queued delete.
    pub fn drain(&self) -> StorageResult<DrainReport> {
        let adds = std::mem::take(&mut *self.inner.pending_adds.lock().map_err(lock_error)?);
        let deletes = std::mem::take(&mut *self.inner.pending_deletes.lock().map_err(lock_error)?);

        let mut strokes = self.inner.strokes.write().map_err(lock_error)?;
        let mut report = DrainReport::default();
        for stroke in adds {
            strokes.insert(stroke.id.clone(), stroke);
            report.added += 1;
        }
        for id in deletes {
            if strokes.remove(&id).is_some() {
                report.deleted += 1;
            }
        }
        Ok(report)
    }
}

impl StrokeStore for MemoryStore {
    fn fetch_all(&self) -> FetchFuture {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let strokes = inner.strokes.read().map_err(lock_error)?;
            let all: Vec<StrokePayload> = strokes.values().cloned().collect();
            Ok(all)
        })
    }

    fn enqueue_add(&self, stroke: StrokePayload) -> StorageResult<()> {
        self.inner.pending_adds.lock().map_err(lock_error)?.push(stroke);
        Ok(())
    }

    fn enqueue_delete(&self, id: StrokeId) -> StorageResult<()> {
        self.inner.pending_deletes.lock().map_err(lock_error)?.push(id);
        Ok(())
    }
}
