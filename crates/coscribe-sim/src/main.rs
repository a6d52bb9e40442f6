//! Headless two-peer session (native).
//!
//! Boots two engines on an in-process relay and a shared memory store, plays
//! a short scripted session and logs what each peer ends up seeing.
//!
//! Usage: `coscribe-sim [config.json]`. Set `RUST_LOG=debug` for per-message detail.

use coscribe_core::{
    Duration, Engine, EngineConfig, EngineError, HeadlessHost, InputEvent, Instant, KeyEvent, MemoryHub,
    MemoryStore, MemoryTransport, MouseButton, PointerEvent, RecordingSurface, RenderScheduler, Size, StrokePayload,
    StrokeStore, UserInfo,
};
use kurbo::{Point, Vec2};

const FRAME: Duration = Duration::from_millis(16);

type Peer = Engine<MemoryTransport, MemoryStore>;

struct Session {
    clock: Instant,
    alice: Peer,
    bob: Peer,
    alice_view: RenderScheduler<RecordingSurface>,
    bob_view: RenderScheduler<RecordingSurface>,
}

impl Session {
    /// Advance one frame on both peers.
    fn frame(&mut self) {
        self.clock += FRAME;
        self.alice.tick(self.clock, &mut self.alice_view);
        self.bob.tick(self.clock, &mut self.bob_view);
    }

    fn settle(&mut self, frames: usize) {
        for _ in 0..frames {
            self.frame();
        }
    }

    /// Drag alice's primary button through `points` (screen space), one sample per frame.
    fn alice_drag(&mut self, points: &[Point]) {
        let mut last = points.first().copied().unwrap_or(Point::ZERO);
        for &position in points {
            let event = InputEvent::Pointer(PointerEvent::Move {
                position,
                delta: position - last,
                button: Some(MouseButton::Left),
            });
            self.alice.handle_input(&event, self.clock);
            last = position;
            self.frame();
        }
        self.alice
            .handle_input(&InputEvent::Pointer(PointerEvent::Up { position: last }), self.clock);
        self.frame();
    }

    fn log_state(&self, label: &str) {
        for peer in [&self.alice, &self.bob] {
            log::info!(
                "[{label}] {}: {} committed, {} in progress, {} remote cursors, zoom {:.2}",
                peer.user().display_name(),
                peer.registry().committed_len(),
                peer.registry().in_progress_len(),
                peer.remote_cursors().len(),
                peer.camera().zoom(),
            );
        }
    }
}

fn wave(origin: Point, samples: usize) -> Vec<Point> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / 4.0;
            origin + Vec2::new(t * 12.0, (t * 1.3).sin() * 20.0)
        })
        .collect()
}

fn run() -> Result<(), EngineError> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    // One stroke left over from an earlier session.
    let store = MemoryStore::with_strokes([StrokePayload {
        id: "seed".to_string(),
        thickness: 6.0,
        color: "#3357FF".to_string(),
        layer: 0,
        points: vec![[40.0, 300.0], [400.0, 300.0]],
    }]);
    let hub = MemoryHub::new();
    let mut host = HeadlessHost {
        size: Size::new(1280.0, 720.0),
    };

    let mut session = Session {
        clock: Instant::now(),
        alice: Engine::new(
            config.clone(),
            UserInfo::generate(Some("alice".to_string())),
            hub.connect(),
            store.clone(),
        )?,
        bob: Engine::new(config, UserInfo::generate(Some("bob".to_string())), hub.connect(), store.clone())?,
        alice_view: RenderScheduler::new(&mut host)?,
        bob_view: RenderScheduler::new(&mut host)?,
    };

    session.alice.start(session.clock);
    session.bob.start(session.clock);
    session.settle(2);
    session.log_state("joined");

    session.alice_drag(&wave(Point::new(100.0, 100.0), 40));
    session.alice_drag(&wave(Point::new(100.0, 200.0), 25));
    session.settle(4);
    session.log_state("drawn");

    // Bob zooms in and pans; alice's strokes stay where they are in the world.
    let zoom_in = InputEvent::Key(KeyEvent::Pressed("=".to_string()));
    session.bob.handle_input(&zoom_in, session.clock);
    let pan = InputEvent::Pointer(PointerEvent::Move {
        position: Point::new(640.0, 360.0),
        delta: Vec2::new(-80.0, -40.0),
        button: Some(MouseButton::Right),
    });
    session.bob.handle_input(&pan, session.clock);
    session.settle(90);
    session.log_state("bob moved");

    // Alice erases across the seed stroke and her first wave.
    session.alice.set_delete_mode(true);
    session.alice_drag(&[Point::new(200.0, 80.0), Point::new(200.0, 140.0), Point::new(200.0, 300.0)]);
    session.alice.set_delete_mode(false);
    session.settle(4);
    session.log_state("erased");

    let report = store.drain()?;
    let persisted = pollster::block_on(store.fetch_all())?;
    log::info!(
        "Store applied {} adds and {} deletes, now holds {} strokes",
        report.added,
        report.deleted,
        persisted.len()
    );

    session.alice.shutdown();
    session.bob.shutdown();
    log::info!("Relay carried {} messages", hub.sent_count());
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Starting coscribe session");

    if let Err(e) = run() {
        log::error!("Session failed: {e}");
        std::process::exit(1);
    }
}
