//! Coscribe Core Library
//!
//! Collaborative line-state engine: freehand strokes, a layered registry,
//! dirty-flag rendering onto two surfaces and reconciliation of local and
//! remote edits for a shared drawing.

pub mod camera;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod input;
pub mod presence;
pub mod registry;
pub mod render;
pub mod storage;
pub mod stroke;
pub mod sync;
pub mod timer;
pub mod tombstone;

pub use camera::Camera;
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineError, Pen};
pub use geometry::{Bounds, GeometryError, Point, Size, Vec2};
pub use input::{InputDispatcher, InputEvent, Intent, KeyEvent, MouseButton, PointerEvent, TouchEvent};
pub use presence::{Cursor, UserInfo};
pub use registry::{AuthorId, DirtyFlags, Registry};
pub use render::{FrameReport, HeadlessHost, RecordingSurface, RenderError, RenderScheduler, Surface, SurfaceHost, SurfaceKind};
pub use storage::{MemoryStore, StorageError, StrokeStore};
pub use stroke::{Stroke, StrokeError, StrokeId, StrokePayload};
pub use sync::{Channel, Envelope, MemoryHub, MemoryTransport, Message, Transport, WireError};
pub use timer::{Duration, Instant};
pub use tombstone::{TombstoneKind, Tombstones};
