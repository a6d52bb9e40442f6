//! Reconciliation engine.
//!
//! Owns the registry, camera, tombstones and cursors, and is the only thing
//! that writes them. Local input, remote messages and the initial store fetch
//! all funnel through here; [`Engine::tick`] drives everything time-based and
//! then hands a read-only view to the render scheduler.

use crate::camera::Camera;
use crate::config::{ConfigError, EngineConfig};
use crate::geometry::{Point, Vec2};
use crate::input::{InputDispatcher, InputEvent, Intent};
use crate::presence::{Cursor, UserInfo};
use crate::registry::{AuthorId, Registry};
use crate::render::{FrameReport, RenderError, RenderScheduler, Surface};
use crate::storage::{FetchFuture, StorageError, StrokeStore};
use crate::stroke::{Stroke, StrokeError, StrokeId, StrokePayload};
use crate::sync::{CommitMessage, CursorData, CursorUpdate, Envelope, Message, Transport, WireError, WirePosition};
use crate::timer::{Instant, IntervalTimer, Throttle};
use crate::tombstone::{TombstoneKind, Tombstones};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::task::{Context, Poll, Waker};
use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Stroke(#[from] StrokeError),
}

/// Drawing tool settings applied to new strokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pen {
    /// `None` means no pen is selected: a primary drag pans instead of drawing.
    pub name: Option<String>,
    pub color: String,
    pub thickness: f64,
    pub layer: usize,
    pub smoothing: bool,
}

impl Pen {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            name: Some("pen".to_string()),
            color: config.default_color.clone(),
            thickness: config.default_thickness,
            layer: 0,
            smoothing: true,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.name.is_some()
    }
}

/// Local authoring state. Finalizing happens synchronously on release.
#[derive(Debug, Clone, PartialEq)]
enum DrawState {
    Idle,
    Drawing { layer: usize, id: StrokeId },
}

pub struct Engine<T: Transport, S: StrokeStore> {
    config: EngineConfig,
    registry: Registry,
    camera: Camera,
    tombstones: Tombstones,
    input: InputDispatcher,
    local: Cursor,
    remote_cursors: HashMap<AuthorId, Cursor>,
    pen: Pen,
    delete_mode: bool,
    draw_state: DrawState,
    /// Ids erased locally, waiting for the next delete flush.
    pending_deletes: Vec<StrokeId>,
    cursor_throttle: Throttle,
    delete_throttle: Throttle,
    tombstone_timer: IntervalTimer,
    pending_fetch: Option<FetchFuture>,
    running: bool,
    transport: T,
    store: S,
}

impl<T: Transport, S: StrokeStore> Engine<T, S> {
    pub fn new(config: EngineConfig, user: UserInfo, transport: T, store: S) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            registry: Registry::new(config.max_layers),
            camera: Camera::new(config.min_zoom, config.max_zoom),
            tombstones: Tombstones::new(),
            input: InputDispatcher::new(),
            local: Cursor::new(user),
            remote_cursors: HashMap::new(),
            pen: Pen::from_config(&config),
            delete_mode: false,
            draw_state: DrawState::Idle,
            pending_deletes: Vec::new(),
            cursor_throttle: Throttle::new(config.broadcast_interval()),
            delete_throttle: Throttle::new(config.broadcast_interval()),
            tombstone_timer: IntervalTimer::new(config.tombstone_ttl()),
            pending_fetch: None,
            running: false,
            transport,
            store,
            config,
        })
    }

    // --- Accessors ---

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    pub fn user(&self) -> &UserInfo {
        &self.local.user
    }

    pub fn remote_cursors(&self) -> &HashMap<AuthorId, Cursor> {
        &self.remote_cursors
    }

    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    pub fn is_drawing(&self) -> bool {
        self.draw_state != DrawState::Idle
    }

    pub fn pending_deletes(&self) -> &[StrokeId] {
        &self.pending_deletes
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the initial store fetch is still outstanding.
    pub fn is_fetching(&self) -> bool {
        self.pending_fetch.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // --- Lifecycle ---

    /// Arm the tombstone timer, start the initial fetch and announce presence.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.tombstone_timer.start(now);
        self.pending_fetch = Some(self.store.fetch_all());
        self.broadcast_cursor(now, true);
        log::info!("Engine started for user {}", self.local.user.id);
    }

    /// Cancel timers, abandon the fetch and leave the session.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.tombstone_timer.cancel();
        self.pending_fetch = None;
        self.transport.close();
        log::info!("Engine shut down for user {}", self.local.user.id);
    }

    // --- Local settings ---

    pub fn set_pen(&mut self, pen: Pen) -> Result<(), EngineError> {
        if !(pen.thickness > 0.0 && pen.thickness.is_finite()) {
            return Err(StrokeError::NonPositiveThickness(pen.thickness).into());
        }
        if pen.layer >= self.registry.max_layers() {
            return Err(StrokeError::LayerOutOfRange {
                layer: pen.layer,
                max_layers: self.registry.max_layers(),
            }
            .into());
        }
        self.pen = pen;
        Ok(())
    }

    pub fn set_delete_mode(&mut self, enabled: bool) {
        self.delete_mode = enabled;
    }

    /// Update the local profile. Peers see it with the next cursor broadcast.
    pub fn set_profile(&mut self, username: Option<String>, color: Option<String>) {
        self.local.user.username = username;
        if let Some(color) = color {
            self.local.user.color = color;
        }
        log::info!("Profile updated: {}", self.local.user.display_name());
    }

    // --- Local input ---

    pub fn handle_input(&mut self, event: &InputEvent, now: Instant) {
        let draw_enabled = self.pen.is_selected() || self.delete_mode;
        let intents = self
            .input
            .dispatch(event, &self.camera, draw_enabled, self.config.zoom_step);
        for intent in intents {
            self.apply_intent(intent, now);
        }
    }

    pub fn apply_intent(&mut self, intent: Intent, now: Instant) {
        match intent {
            Intent::Hover { world } => {
                self.local.position = world;
                self.broadcast_cursor(now, false);
            }
            Intent::Draw { world } if self.delete_mode => self.erase_at(world, now),
            Intent::Draw { world } => self.draw_to(world, now),
            Intent::Pan { delta } => self.pan(delta),
            Intent::Zoom { step } => {
                self.camera.zoom_by(step);
                self.registry.dirty_mut().mark_all();
            }
            Intent::PinchZoom { factor } => {
                self.camera.zoom_scale(factor);
                self.registry.dirty_mut().mark_all();
            }
            Intent::Release => self.release(),
        }
    }

    /// Move the view by a screen-space delta. Cursors live in world space,
    /// so their screen positions follow the content automatically.
    pub fn pan(&mut self, delta: Vec2) {
        self.camera.pan(delta);
        self.registry.dirty_mut().mark_all();
    }

    fn draw_to(&mut self, world: Point, now: Instant) {
        let layer = if let DrawState::Drawing { layer, .. } = self.draw_state {
            layer
        } else {
            let stroke = Stroke::with_new_id(self.pen.thickness, self.pen.color.clone(), self.pen.layer);
            let id = stroke.id().to_string();
            if let Err(e) = self.registry.upsert_in_progress(&self.local.user.id, stroke) {
                log::warn!("Cannot start stroke: {e}");
                return;
            }
            log::debug!("Started stroke {id} on layer {}", self.pen.layer);
            self.draw_state = DrawState::Drawing {
                layer: self.pen.layer,
                id,
            };
            self.pen.layer
        };

        match self.registry.in_progress_mut(layer, &self.local.user.id) {
            Some(stroke) => stroke.append_point(world),
            None => {
                // Removed underneath us by a remote delete; the next sample starts over.
                self.draw_state = DrawState::Idle;
                return;
            }
        }
        self.local.position = world;
        self.broadcast_cursor(now, false);
    }

    /// Finalize the local stroke: simplify, commit, broadcast and persist.
    fn release(&mut self) {
        let DrawState::Drawing { layer, id } = std::mem::replace(&mut self.draw_state, DrawState::Idle) else {
            return;
        };
        let Some(mut stroke) = self.registry.take_in_progress(layer, &self.local.user.id) else {
            log::warn!("Stroke {id} vanished before release");
            return;
        };

        stroke.simplify(self.config.simplify_epsilon, self.config.smoothing_radius, self.pen.smoothing);
        let payload = stroke.to_payload();
        let persist = stroke.is_renderable();
        if let Err(e) = self.registry.insert_committed(stroke) {
            log::warn!("Cannot commit stroke {id}: {e}");
            return;
        }

        let commit = CommitMessage {
            author: self.local.user.id.clone(),
            line: payload.clone(),
        };
        if let Err(e) = self.transport.publish_commit(commit) {
            log::warn!("Failed to publish commit {id}: {e}");
        }
        if persist {
            if let Err(e) = self.store.enqueue_add(payload) {
                log::warn!("Failed to queue stroke {id} for storage: {e}");
            }
        } else {
            log::debug!("Stroke {id} has no renderable geometry, not persisted");
        }
        log::debug!("Committed stroke {id}");
    }

    /// Remove every committed stroke under `world` and queue the ids.
    fn erase_at(&mut self, world: Point, now: Instant) {
        for id in self.registry.committed_hits(world) {
            self.registry.remove_committed(&id);
            self.tombstones.insert(id.clone(), TombstoneKind::Deleted);
            log::debug!("Erased stroke {id}");
            self.pending_deletes.push(id);
        }
        self.local.position = world;
        self.broadcast_cursor(now, false);
    }

    /// Send queued deletions, at most once per broadcast interval.
    fn flush_deletes(&mut self, now: Instant) {
        if self.pending_deletes.is_empty() || !self.delete_throttle.try_fire(now) {
            return;
        }
        let ids = std::mem::take(&mut self.pending_deletes);
        for id in &ids {
            if let Err(e) = self.store.enqueue_delete(id.clone()) {
                log::warn!("Failed to queue deletion of {id}: {e}");
            }
        }
        log::debug!("Flushing {} deletions", ids.len());
        if let Err(e) = self.transport.publish_delete(ids) {
            log::warn!("Failed to publish deletions: {e}");
        }
    }

    fn broadcast_cursor(&mut self, now: Instant, force: bool) {
        if force {
            self.cursor_throttle.mark_fired(now);
        } else if !self.cursor_throttle.try_fire(now) {
            return;
        }
        let current_line = match self.draw_state {
            DrawState::Drawing { .. } => self.registry.get_in_progress(&self.local.user.id).map(Stroke::to_payload),
            DrawState::Idle => None,
        };
        let update = CursorUpdate {
            position: WirePosition {
                x: self.local.position.x,
                y: self.local.position.y,
            },
            data: CursorData {
                user: self.local.user.clone(),
                current_line,
            },
        };
        if let Err(e) = self.transport.publish_cursor(update) {
            log::warn!("Failed to publish cursor: {e}");
        }
    }

    // --- Remote messages ---

    /// Decode and apply one raw message. Malformed input is logged and dropped.
    pub fn handle_envelope(&mut self, envelope: &Envelope) {
        let result = Message::from_envelope(envelope).and_then(|message| self.apply_message(message));
        if let Err(e) = result {
            log::warn!("Dropping {:?} message: {e}", envelope.channel);
        }
    }

    pub fn apply_message(&mut self, message: Message) -> Result<(), WireError> {
        match message {
            Message::Cursor(update) => self.handle_cursor_update(update),
            Message::Commit(commit) => self.handle_commit(commit),
            Message::Delete(ids) => {
                self.handle_deletes(ids);
                Ok(())
            }
        }
    }

    /// Peer presence, optionally carrying the peer's in-progress stroke.
    pub fn handle_cursor_update(&mut self, update: CursorUpdate) -> Result<(), WireError> {
        let CursorUpdate {
            position,
            data: CursorData { user, current_line },
        } = update;
        if user.id == self.local.user.id {
            return Ok(());
        }

        let author = user.id.clone();

        // Validate the preview before touching any state so a bad payload is dropped whole.
        let preview = match current_line {
            Some(line) if self.tombstones.contains(&line.id) || self.registry.contains_committed(&line.id) => {
                log::debug!("Dropping stale preview of {} from {author}", line.id);
                self.registry.remove_in_progress_author(&author);
                None
            }
            Some(line) => {
                let stroke = Stroke::from_payload(line, false)?;
                stroke.check_layer(self.registry.max_layers())?;
                Some(stroke)
            }
            None => None,
        };

        self.remote_cursors.insert(
            author.clone(),
            Cursor {
                user,
                position: Point::new(position.x, position.y),
            },
        );
        self.registry.dirty_mut().dynamic_dirty = true;
        if let Some(stroke) = preview {
            self.registry.upsert_in_progress(&author, stroke)?;
        }
        Ok(())
    }

    /// A peer finalized a stroke.
    pub fn handle_commit(&mut self, commit: CommitMessage) -> Result<(), WireError> {
        let CommitMessage { author, line } = commit;
        if author == self.local.user.id {
            return Ok(());
        }
        if self.tombstones.is_deleted(&line.id) {
            log::debug!("Dropping commit of deleted stroke {}", line.id);
            self.registry.remove_in_progress_stroke(&line.id);
            return Ok(());
        }

        let id = line.id.clone();
        let stroke = Stroke::from_payload(line, true)?;
        self.registry.insert_committed(stroke)?;
        self.registry.remove_in_progress_stroke(&id);
        log::debug!("Committed remote stroke {id} from {author}");
        self.tombstones.insert(id, TombstoneKind::Committed);
        Ok(())
    }

    /// Remove strokes by id. Absent ids are ignored.
    ///
    /// Previews still showing a deleted id are left to the next dynamic pass,
    /// which draws them once more and reports them for eviction.
    pub fn handle_deletes(&mut self, ids: Vec<StrokeId>) {
        for id in ids {
            if self.registry.remove_committed(&id).is_some() {
                log::debug!("Deleted stroke {id}");
            }
            self.tombstones.insert(id, TombstoneKind::Deleted);
        }
        self.registry.dirty_mut().mark_all();
    }

    /// Merge strokes loaded from the store. Strokes already known or deleted
    /// in the meantime are skipped. Returns how many were added.
    pub fn merge_fetched(&mut self, payloads: Vec<StrokePayload>) -> usize {
        let mut merged = 0;
        for payload in payloads {
            if self.tombstones.is_deleted(&payload.id) || self.registry.contains_committed(&payload.id) {
                continue;
            }
            let id = payload.id.clone();
            let result = Stroke::from_payload(payload, true).and_then(|stroke| self.registry.insert_committed(stroke));
            match result {
                Ok(()) => merged += 1,
                Err(e) => log::warn!("Skipping stored stroke {id}: {e}"),
            }
        }
        self.registry.dirty_mut().static_dirty = true;
        log::info!("Merged {merged} stored strokes");
        merged
    }

    fn poll_fetch(&mut self) {
        let Some(fetch) = self.pending_fetch.as_mut() else {
            return;
        };
        let mut cx = Context::from_waker(Waker::noop());
        let poll = fetch.as_mut().poll(&mut cx);
        if let Poll::Ready(result) = poll {
            self.pending_fetch = None;
            match result {
                Ok(payloads) => {
                    self.merge_fetched(payloads);
                }
                Err(e) => log::warn!("Initial fetch failed: {e}"),
            }
        }
    }

    // --- Tick ---

    fn update_camera(&mut self) {
        if self.camera.is_settled(0.0, 0.0) {
            return;
        }
        self.camera.smooth_step(self.config.camera_smoothing);
        if self
            .camera
            .is_settled(self.config.camera_settle_distance, self.config.camera_settle_zoom)
        {
            self.camera.snap();
        }
        self.registry.dirty_mut().mark_all();
    }

    /// One animation frame: drain the transport, poll the fetch, flush
    /// deletions, expire tombstones, advance the camera and render.
    pub fn tick<R: Surface>(&mut self, now: Instant, scheduler: &mut RenderScheduler<R>) -> FrameReport {
        for envelope in self.transport.poll_incoming() {
            self.handle_envelope(&envelope);
        }
        self.poll_fetch();
        self.flush_deletes(now);
        if self.tombstone_timer.poll(now) {
            log::debug!("Clearing {} tombstones", self.tombstones.len());
            self.tombstones.clear();
        }
        self.update_camera();

        let report = scheduler.render(&self.registry, &self.camera, &self.tombstones);

        for (layer, author) in &report.stale_in_progress {
            if *author != self.local.user.id {
                self.registry.take_in_progress(*layer, author);
            }
        }
        let dirty = self.registry.dirty_mut();
        dirty.static_dirty = false;
        dirty.dynamic_dirty = report.render_again();
        report
    }
}

impl<T: Transport, S: StrokeStore> Drop for Engine<T, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{MouseButton, PointerEvent};
    use crate::render::{HeadlessHost, RecordingSurface};
    use crate::storage::MemoryStore;
    use crate::sync::{Channel, MemoryHub, MemoryTransport};
    use crate::timer::Duration;
    use crate::geometry::Size;

    type TestEngine = Engine<MemoryTransport, MemoryStore>;

    fn peer(hub: &MemoryHub, store: &MemoryStore, id: &str) -> TestEngine {
        let mut engine = Engine::new(EngineConfig::default(), UserInfo::new(id, None), hub.connect(), store.clone()).unwrap();
        let mut pen = Pen::from_config(engine.config());
        pen.smoothing = false;
        engine.set_pen(pen).unwrap();
        engine
    }

    fn scheduler() -> RenderScheduler<RecordingSurface> {
        RenderScheduler::new(&mut HeadlessHost {
            size: Size::new(800.0, 600.0),
        })
        .unwrap()
    }

    fn drag(engine: &mut TestEngine, points: &[(f64, f64)], now: Instant) {
        for &(x, y) in points {
            let event = InputEvent::Pointer(PointerEvent::Move {
                position: Point::new(x, y),
                delta: Vec2::ZERO,
                button: Some(MouseButton::Left),
            });
            engine.handle_input(&event, now);
        }
        engine.handle_input(&InputEvent::Pointer(PointerEvent::Up { position: Point::ZERO }), now);
    }

    fn payload(id: &str, points: &[[f64; 2]]) -> StrokePayload {
        StrokePayload {
            id: id.to_string(),
            thickness: 4.0,
            color: "black".to_string(),
            layer: 0,
            points: points.to_vec(),
        }
    }

    fn preview(author: &str, line: StrokePayload) -> CursorUpdate {
        CursorUpdate {
            position: WirePosition { x: 0.0, y: 0.0 },
            data: CursorData {
                user: UserInfo::new(author, None),
                current_line: Some(line),
            },
        }
    }

    fn commit(author: &str, line: StrokePayload) -> CommitMessage {
        CommitMessage {
            author: author.to_string(),
            line,
        }
    }

    fn committed_ids(engine: &TestEngine) -> Vec<String> {
        let mut ids: Vec<String> = (0..engine.registry().max_layers())
            .flat_map(|layer| engine.registry().committed(layer).map(|s| s.id().to_string()))
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_local_stroke_lifecycle() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let now = Instant::now();

        drag(&mut a, &[(0.0, 0.0), (0.1, 0.1), (5.0, 5.0)], now);

        assert!(!a.is_drawing());
        assert_eq!(a.registry().in_progress_len(), 0);
        let stroke = a.registry().committed(0).next().unwrap();
        assert_eq!(stroke.points(), &[Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert!(stroke.is_sealed());
        assert_eq!(store.pending().unwrap(), (1, 0));
    }

    #[test]
    fn test_remote_preview_then_commit() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        let now = Instant::now();

        let down = InputEvent::Pointer(PointerEvent::Move {
            position: Point::new(1.0, 1.0),
            delta: Vec2::ZERO,
            button: Some(MouseButton::Left),
        });
        a.handle_input(&down, now);
        b.tick(now, &mut view);
        assert!(b.remote_cursors().contains_key("alice"));
        let shown = b.registry().get_in_progress("alice").unwrap();
        assert_eq!(shown.len(), 1);
        assert!(shown.bounds().is_none());

        a.handle_input(&InputEvent::Pointer(PointerEvent::Up { position: Point::ZERO }), now);
        b.tick(now, &mut view);
        assert_eq!(b.registry().in_progress_len(), 0);
        assert_eq!(b.registry().committed_len(), 1);
        assert_eq!(b.tombstones().len(), 1);
    }

    #[test]
    fn test_stale_preview_never_resurrects_commit() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut b = peer(&hub, &store, "bob");
        let line = payload("x", &[[0.0, 0.0], [10.0, 0.0]]);

        // Preview first, then the commit.
        b.handle_cursor_update(preview("alice", line.clone())).unwrap();
        assert_eq!(b.registry().in_progress_len(), 1);
        b.handle_commit(commit("alice", line.clone())).unwrap();
        assert_eq!(b.registry().in_progress_len(), 0);

        // Late previews from the author or anyone else are dropped.
        b.handle_cursor_update(preview("alice", line.clone())).unwrap();
        b.handle_cursor_update(preview("carol", line.clone())).unwrap();
        assert_eq!(b.registry().in_progress_len(), 0);
        assert!(b.registry().contains_committed("x"));

        // Duplicate commit is a no-op.
        b.handle_commit(commit("alice", line)).unwrap();
        assert_eq!(b.registry().committed_len(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut once = peer(&hub, &store, "p1");
        let mut twice = peer(&hub, &store, "p2");
        for engine in [&mut once, &mut twice] {
            engine.handle_commit(commit("alice", payload("A", &[[0.0, 0.0], [1.0, 1.0]]))).unwrap();
            engine.handle_commit(commit("alice", payload("C", &[[5.0, 5.0], [6.0, 6.0]]))).unwrap();
        }

        once.handle_deletes(vec!["A".into()]);
        twice.handle_deletes(vec!["A".into(), "A".into(), "B".into()]);
        assert_eq!(committed_ids(&once), committed_ids(&twice));
        assert_eq!(committed_ids(&once), vec!["C"]);
    }

    #[test]
    fn test_delete_overtaking_commit() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut b = peer(&hub, &store, "bob");

        b.handle_deletes(vec!["x".into()]);
        b.handle_commit(commit("alice", payload("x", &[[0.0, 0.0], [1.0, 1.0]]))).unwrap();
        assert!(!b.registry().contains_committed("x"));
        assert!(b.tombstones().is_deleted("x"));
    }

    #[test]
    fn test_deleted_preview_drawn_once_then_evicted() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        let now = Instant::now();

        b.handle_cursor_update(preview("alice", payload("x", &[[0.0, 0.0], [10.0, 0.0]]))).unwrap();
        b.tick(now, &mut view);

        // The delete overtakes alice's commit while her preview is still shown.
        b.handle_deletes(vec!["x".into()]);
        assert_eq!(b.registry().in_progress_len(), 1);

        let report = b.tick(now, &mut view);
        assert_eq!(report.stale_in_progress, vec![(0, "alice".to_string())]);
        assert_eq!(view.dynamic_surface().visible_polylines(), 1);
        assert_eq!(b.registry().in_progress_len(), 0);
        assert!(b.registry().dirty().dynamic_dirty);

        let report = b.tick(now, &mut view);
        assert!(report.stale_in_progress.is_empty());
        assert_eq!(view.dynamic_surface().visible_polylines(), 0);
        assert!(!b.registry().dirty().any());

        // The commit that arrives afterwards stays dropped.
        b.handle_commit(commit("alice", payload("x", &[[0.0, 0.0], [10.0, 0.0]]))).unwrap();
        assert!(!b.registry().contains_committed("x"));
    }

    #[test]
    fn test_own_echo_ignored() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");

        a.handle_cursor_update(preview("alice", payload("x", &[[0.0, 0.0]]))).unwrap();
        a.handle_commit(commit("alice", payload("y", &[[0.0, 0.0], [1.0, 0.0]]))).unwrap();
        assert!(a.remote_cursors().is_empty());
        assert_eq!(a.registry().in_progress_len(), 0);
        assert_eq!(a.registry().committed_len(), 0);
    }

    #[test]
    fn test_erase_is_immediate_and_batched() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let mut b = peer(&hub, &store, "bob");
        let mut view_a = scheduler();
        let mut view_b = scheduler();
        let t0 = Instant::now();

        drag(&mut a, &[(0.0, 0.0), (10.0, 0.0)], t0);
        drag(&mut a, &[(5.0, -5.0), (5.0, 5.0)], t0);
        drag(&mut a, &[(100.0, 100.0), (110.0, 100.0)], t0);
        b.tick(t0, &mut view_b);
        assert_eq!(b.registry().committed_len(), 3);

        a.set_delete_mode(true);
        let erase = InputEvent::Pointer(PointerEvent::Move {
            position: Point::new(5.0, 0.0),
            delta: Vec2::ZERO,
            button: Some(MouseButton::Left),
        });
        a.handle_input(&erase, t0);
        assert_eq!(a.registry().committed_len(), 1);
        assert_eq!(a.pending_deletes().len(), 2);
        assert_eq!(b.registry().committed_len(), 3);

        let sent_before = hub.sent_count();
        a.tick(t0, &mut view_a);
        assert!(a.pending_deletes().is_empty());
        assert_eq!(hub.sent_count(), sent_before + 1);
        assert_eq!(store.pending().unwrap(), (3, 2));

        b.tick(t0, &mut view_b);
        assert_eq!(b.registry().committed_len(), 1);
    }

    #[test]
    fn test_pan_shifts_cursors() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let now = Instant::now();

        let mut update = preview("bob", payload("s", &[[0.0, 0.0]]));
        update.position = WirePosition { x: 40.0, y: 40.0 };
        a.handle_cursor_update(update).unwrap();

        let before = a.remote_cursors()["bob"].screen_position(a.camera());
        let pan = InputEvent::Pointer(PointerEvent::Move {
            position: Point::new(0.0, 0.0),
            delta: Vec2::new(15.0, -25.0),
            button: Some(MouseButton::Right),
        });
        a.handle_input(&pan, now);

        assert_eq!(a.camera().position(), Point::new(-15.0, 25.0));
        let after = a.remote_cursors()["bob"].screen_position(a.camera());
        assert!((after.x - before.x - 15.0).abs() < 1e-10);
        assert!((after.y - before.y + 25.0).abs() < 1e-10);
        assert!(a.registry().dirty().static_dirty);
    }

    #[test]
    fn test_malformed_messages_dropped() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        b.handle_commit(commit("alice", payload("x", &[[0.0, 0.0], [1.0, 1.0]]))).unwrap();

        for (channel, raw) in [
            (Channel::Cursor, "garbage"),
            (Channel::Cursor, r#"{"author":"a","line":{"id":"y","thickness":-1,"color":"c","layer":0,"points":[]}}"#),
            (Channel::Cursor, r#"{"author":"a","line":{"id":"z","thickness":1,"color":"c","layer":9,"points":[]}}"#),
            (Channel::Delete, "[1, 2]"),
            (Channel::Delete, r#"["x"]"#),
        ] {
            hub.inject(Envelope {
                channel,
                payload: raw.to_string(),
            });
        }
        b.tick(Instant::now(), &mut view);
        assert_eq!(b.registry().committed_len(), 0);
        assert!(b.tombstones().is_deleted("x"));
    }

    #[test]
    fn test_invalid_preview_leaves_no_trace() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        b.tick(Instant::now(), &mut view);

        for raw in [
            r#"{"position":{"x":1,"y":2},"data":{"user":{"id":"mallory","color":"red"},"currentLine":{"id":"m1","thickness":-1,"color":"c","layer":0,"points":[[0,0]]}}}"#,
            r#"{"position":{"x":1,"y":2},"data":{"user":{"id":"mallory","color":"red"},"currentLine":{"id":"m2","thickness":1,"color":"c","layer":9,"points":[[0,0]]}}}"#,
        ] {
            hub.inject(Envelope {
                channel: Channel::Cursor,
                payload: raw.to_string(),
            });
        }
        b.tick(Instant::now(), &mut view);
        assert!(b.remote_cursors().is_empty());
        assert_eq!(b.registry().in_progress_len(), 0);
        assert!(!b.registry().dirty().dynamic_dirty);
    }

    #[test]
    fn test_default_pen_keeps_stroke_ends() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = Engine::new(EngineConfig::default(), UserInfo::new("alice", None), hub.connect(), store.clone()).unwrap();
        assert!(a.pen().smoothing);

        drag(&mut a, &[(0.0, 0.0), (50.0, 0.0), (100.0, 0.0)], Instant::now());

        let stroke = a.registry().committed(0).next().unwrap();
        assert_eq!(stroke.points().first(), Some(&Point::new(0.0, 0.0)));
        assert_eq!(stroke.points().last(), Some(&Point::new(100.0, 0.0)));
        assert!(stroke.hit_test(Point::new(5.0, 0.0)));
        assert!(stroke.hit_test(Point::new(95.0, 0.0)));
    }

    #[test]
    fn test_initial_fetch_merges_on_tick() {
        let hub = MemoryHub::new();
        let mut bad = payload("bad", &[[0.0, 0.0]]);
        bad.thickness = 0.0;
        let store = MemoryStore::with_strokes([
            payload("a", &[[0.0, 0.0], [1.0, 1.0]]),
            payload("b", &[[2.0, 2.0], [3.0, 3.0]]),
            payload("gone", &[[2.0, 2.0], [3.0, 3.0]]),
            bad,
        ]);
        let mut engine = peer(&hub, &store, "alice");
        let mut view = scheduler();
        let now = Instant::now();

        engine.handle_deletes(vec!["gone".into()]);
        engine.start(now);
        assert!(engine.is_running());
        assert!(engine.is_fetching());

        engine.tick(now, &mut view);
        assert!(!engine.is_fetching());
        assert_eq!(committed_ids(&engine), vec!["a", "b"]);
        assert!(engine.registry().get_committed("a").unwrap().bounds().is_some());
        assert_eq!(view.static_surface().visible_polylines(), 2);
    }

    #[test]
    fn test_tombstones_expire() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        let t0 = Instant::now();
        b.start(t0);

        b.handle_commit(commit("alice", payload("x", &[[0.0, 0.0], [1.0, 1.0]]))).unwrap();
        b.tick(t0 + Duration::from_secs(5), &mut view);
        assert!(b.tombstones().contains("x"));

        b.tick(t0 + Duration::from_secs(10), &mut view);
        assert!(b.tombstones().is_empty());

        // Without the tombstone, the committed copy still keeps previews out.
        b.handle_cursor_update(preview("alice", payload("x", &[[0.0, 0.0]]))).unwrap();
        assert_eq!(b.registry().in_progress_len(), 0);
    }

    #[test]
    fn test_tick_clears_dirty_flags() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let mut view = scheduler();
        let now = Instant::now();

        let report = a.tick(now, &mut view);
        assert!(!report.render_again());
        assert!(!a.registry().dirty().any());

        let commands = view.static_surface().commands().len();
        a.tick(now, &mut view);
        assert_eq!(view.static_surface().commands().len(), commands);
    }

    #[test]
    fn test_camera_animation_redraws_until_settled() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let mut view = scheduler();
        let now = Instant::now();

        a.pan(Vec2::new(-200.0, 0.0));
        a.tick(now, &mut view);
        assert!(!a.camera().is_settled(0.1, 0.01));

        let mut frames = 1;
        while !a.camera().is_settled(0.0, 0.0) {
            a.tick(now, &mut view);
            frames += 1;
            assert!(frames < 500);
        }
        assert!(frames > 10);

        let commands = view.static_surface().commands().len();
        a.tick(now, &mut view);
        assert_eq!(view.static_surface().commands().len(), commands);
    }

    #[test]
    fn test_profile_reaches_peers() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        let now = Instant::now();

        a.set_profile(Some("Alice".to_string()), Some("#000000".to_string()));
        let hover = InputEvent::Pointer(PointerEvent::Move {
            position: Point::new(3.0, 4.0),
            delta: Vec2::ZERO,
            button: None,
        });
        a.handle_input(&hover, now);
        b.tick(now, &mut view);

        let cursor = &b.remote_cursors()["alice"];
        assert_eq!(cursor.user.username.as_deref(), Some("Alice"));
        assert_eq!(cursor.user.color, "#000000");
        assert_eq!(cursor.position, Point::new(3.0, 4.0));
    }

    #[test]
    fn test_cursor_broadcast_is_throttled() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let t0 = Instant::now();

        let hover = |x: f64| {
            InputEvent::Pointer(PointerEvent::Move {
                position: Point::new(x, 0.0),
                delta: Vec2::ZERO,
                button: None,
            })
        };
        for i in 0..10 {
            a.handle_input(&hover(i as f64), t0 + Duration::from_millis(i));
        }
        assert_eq!(hub.sent_count(), 1);
        a.handle_input(&hover(50.0), t0 + Duration::from_millis(45));
        assert_eq!(hub.sent_count(), 2);
    }

    #[test]
    fn test_single_point_stroke_is_inert() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        let now = Instant::now();

        drag(&mut a, &[(1.0, 1.0)], now);
        assert_eq!(a.registry().committed_len(), 1);
        assert_eq!(store.pending().unwrap(), (0, 0));

        b.tick(now, &mut view);
        assert_eq!(b.registry().committed_len(), 1);
        assert_eq!(b.registry().in_progress_len(), 0);
        assert_eq!(view.static_surface().visible_polylines(), 0);
    }

    #[test]
    fn test_primary_drag_pans_without_pen() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let now = Instant::now();

        let mut pen = a.pen().clone();
        pen.name = None;
        a.set_pen(pen).unwrap();
        let drag_event = InputEvent::Pointer(PointerEvent::Move {
            position: Point::new(5.0, 5.0),
            delta: Vec2::new(10.0, 0.0),
            button: Some(MouseButton::Left),
        });
        a.handle_input(&drag_event, now);
        assert!(!a.is_drawing());
        assert_eq!(a.camera().position(), Point::new(-10.0, 0.0));
    }

    #[test]
    fn test_pen_validation() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");

        let mut pen = a.pen().clone();
        pen.layer = 7;
        assert!(matches!(
            a.set_pen(pen.clone()),
            Err(EngineError::Stroke(StrokeError::LayerOutOfRange { layer: 7, max_layers: 3 }))
        ));
        pen.layer = 0;
        pen.thickness = 0.0;
        assert!(a.set_pen(pen).is_err());
    }

    #[test]
    fn test_keyboard_zoom_clamps() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let now = Instant::now();

        for _ in 0..20 {
            a.handle_input(&InputEvent::Key(crate::input::KeyEvent::Pressed("=".to_string())), now);
        }
        assert!((a.camera().zoom() - 2.0).abs() < 1e-10);
        for _ in 0..20 {
            a.handle_input(&InputEvent::Key(crate::input::KeyEvent::Pressed("-".to_string())), now);
        }
        assert!((a.camera().zoom() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_shutdown_leaves_session() {
        let hub = MemoryHub::new();
        let store = MemoryStore::new();
        let mut a = peer(&hub, &store, "alice");
        let mut b = peer(&hub, &store, "bob");
        let mut view = scheduler();
        let now = Instant::now();

        a.start(now);
        a.shutdown();
        assert!(!a.is_running());
        assert!(!a.transport().is_open());

        b.handle_input(
            &InputEvent::Pointer(PointerEvent::Move {
                position: Point::ZERO,
                delta: Vec2::ZERO,
                button: None,
            }),
            now,
        );
        a.tick(now, &mut view);
        assert!(a.remote_cursors().is_empty());
    }
}
