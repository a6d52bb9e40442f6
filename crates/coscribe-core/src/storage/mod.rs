//! Persistent stroke store contract.
//!
//! The engine fetches every stored stroke once at startup and afterwards only
//! appends to the store's add/delete queues. Draining those queues is the
//! store's business.

mod memory;

pub use memory::{DrainReport, MemoryStore};

use crate::stroke::{StrokeId, StrokePayload};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Stroke not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Future returned by [`StrokeStore::fetch_all`]. It owns whatever it needs,
/// so the engine can keep polling it across ticks.
pub type FetchFuture = BoxFuture<'static, StorageResult<Vec<StrokePayload>>>;

/// Backend holding committed strokes between sessions.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait StrokeStore: Send + Sync {
    /// Every stored stroke, in no particular order.
    fn fetch_all(&self) -> FetchFuture;

    /// Queue a committed stroke for writing.
    fn enqueue_add(&self, stroke: StrokePayload) -> StorageResult<()>;

    /// Queue a stroke id for removal.
    fn enqueue_delete(&self, id: StrokeId) -> StorageResult<()>;
}

/// Backend holding committed strokes between sessions (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait StrokeStore {
    /// Every stored stroke, in no particular order.
    fn fetch_all(&self) -> FetchFuture;

    /// Queue a committed stroke for writing.
    fn enqueue_add(&self, stroke: StrokePayload) -> StorageResult<()>;

    /// Queue a stroke id for removal.
    fn enqueue_delete(&self, id: StrokeId) -> StorageResult<()>;
}
