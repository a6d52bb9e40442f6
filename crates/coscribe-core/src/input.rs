//! Input dispatch for mouse/touch/keyboard events.
//!
//! Raw events arrive in screen coordinates. The dispatcher turns them into
//! [`Intent`]s, converting every drawing position to world coordinates with
//! the logical camera so input never lags behind the smoothed view.

use crate::camera::Camera;
use crate::geometry::{Point, Vec2, midpoint};
use serde::{Deserialize, Serialize};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Pointer event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    /// Pointer moved. `button` is the single held button, if any.
    Move {
        position: Point,
        delta: Vec2,
        button: Option<MouseButton>,
    },
    Up {
        position: Point,
    },
}

/// Touch event type. Each event lists every finger currently on the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TouchEvent {
    Start(Vec<Point>),
    Move(Vec<Point>),
    End(Vec<Point>),
}

/// Keyboard event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyEvent {
    Pressed(String),
    Released(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Pointer(PointerEvent),
    Touch(TouchEvent),
    Key(KeyEvent),
}

/// What the engine should do in response to input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    /// Pointer moved with nothing held.
    Hover { world: Point },
    /// Extend the stroke being drawn, or erase, at `world`.
    Draw { world: Point },
    /// Move the view by a screen-space delta.
    Pan { delta: Vec2 },
    /// Add `step` to the zoom.
    Zoom { step: f64 },
    /// Multiply the zoom by `factor`.
    PinchZoom { factor: f64 },
    /// Pointer released or last finger lifted.
    Release,
}

/// Stateful translator from raw events to intents.
#[derive(Debug, Clone, Default)]
pub struct InputDispatcher {
    /// Last single-finger position or two-finger midpoint.
    last_touch: Option<Point>,
    /// Finger distance at the previous two-finger event.
    touch_distance: f64,
}

impl InputDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one event.
    ///
    /// `pen_selected` decides what a primary drag does: draw when a pen is
    /// selected, pan otherwise.
    pub fn dispatch(&mut self, event: &InputEvent, camera: &Camera, pen_selected: bool, zoom_step: f64) -> Vec<Intent> {
        match event {
            InputEvent::Pointer(pointer) => self.dispatch_pointer(pointer, camera, pen_selected),
            InputEvent::Touch(touch) => self.dispatch_touch(touch, camera),
            InputEvent::Key(KeyEvent::Pressed(key)) => match key.as_str() {
                "=" | "+" | "Equal" => vec![Intent::Zoom { step: zoom_step }],
                "-" | "Minus" => vec![Intent::Zoom { step: -zoom_step }],
                _ => Vec::new(),
            },
            InputEvent::Key(KeyEvent::Released(_)) => Vec::new(),
        }
    }

    fn dispatch_pointer(&mut self, event: &PointerEvent, camera: &Camera, pen_selected: bool) -> Vec<Intent> {
        match *event {
            PointerEvent::Move { position, delta, button } => {
                let world = camera.screen_to_world(position);
                match button {
                    None => vec![Intent::Hover { world }],
                    Some(MouseButton::Left) if pen_selected => vec![Intent::Draw { world }],
                    Some(MouseButton::Left) | Some(MouseButton::Right) => vec![Intent::Pan { delta }],
                    Some(MouseButton::Middle) => Vec::new(),
                }
            }
            PointerEvent::Up { .. } => vec![Intent::Release],
        }
    }

    fn dispatch_touch(&mut self, event: &TouchEvent, camera: &Camera) -> Vec<Intent> {
        match event {
            TouchEvent::Start(touches) => {
                match touches.as_slice() {
                    [only] => self.last_touch = Some(*only),
                    [a, b, ..] => {
                        self.last_touch = Some(midpoint(*a, *b));
                        self.touch_distance = a.distance(*b);
                    }
                    [] => {}
                }
                Vec::new()
            }
            TouchEvent::Move(touches) => {
                let Some(last) = self.last_touch else {
                    return Vec::new();
                };
                match touches.as_slice() {
                    [only] => {
                        self.last_touch = Some(*only);
                        vec![Intent::Draw {
                            world: camera.screen_to_world(*only),
                        }]
                    }
                    [a, b, ..] => {
                        let center = midpoint(*a, *b);
                        let distance = a.distance(*b);
                        let mut intents = vec![Intent::Pan { delta: center - last }];
                        if self.touch_distance > 0.0 && distance > 0.0 {
                            intents.push(Intent::PinchZoom {
                                factor: distance / self.touch_distance,
                            });
                        }
                        self.last_touch = Some(center);
                        self.touch_distance = distance;
                        intents
                    }
                    [] => Vec::new(),
                }
            }
            TouchEvent::End(remaining) => {
                if remaining.is_empty() {
                    self.last_touch = None;
                    self.touch_distance = 0.0;
                    vec![Intent::Release]
                } else {
                    // Re-anchor so the next move does not jump.
                    self.last_touch = match remaining.as_slice() {
                        [a, b, ..] => Some(midpoint(*a, *b)),
                        [only] => Some(*only),
                        [] => None,
                    };
                    if remaining.len() < 2 {
                        self.touch_distance = 0.0;
                    }
                    Vec::new()
                }
            }
        }
    }
}
