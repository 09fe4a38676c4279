//! Keyboard and mouse state, fed from engine events.
//!
//! [`Input`] is updated by the application before events reach the layer
//! stack, so layers can poll it during `on_update`.

use glam::Vec2;
use rustc_hash::FxHashSet;

use crate::app::events::Event;

/// Keyboard keys the engine recognizes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KeyCode {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,

    Key0, Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9,

    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,

    Space,
    Enter,
    Escape,
    Backspace,
    Tab,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,

    ShiftLeft,
    ShiftRight,
    ControlLeft,
    ControlRight,
    AltLeft,
    AltRight,
    SuperLeft,
    SuperRight,

    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Current input state plus what changed during this frame.
#[derive(Debug, Clone, Default)]
pub struct Input {
    pressed_keys: FxHashSet<KeyCode>,
    just_pressed_keys: FxHashSet<KeyCode>,
    pressed_mouse: FxHashSet<MouseButton>,
    mouse_position: Vec2,
    mouse_delta: Vec2,
    scroll_delta: Vec2,
    has_cursor: bool,
    screen_size: Vec2,
}

impl Input {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state. Called once per frame before polling events.
    pub fn start_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = Vec2::ZERO;
    }

    pub fn on_event(&mut self, event: &Event) {
        match *event {
            Event::KeyPressed { key, .. } => {
                if self.pressed_keys.insert(key) {
                    self.just_pressed_keys.insert(key);
                }
            }
            Event::KeyReleased { key } => {
                self.pressed_keys.remove(&key);
            }
            Event::MouseButtonPressed { button } => {
                self.pressed_mouse.insert(button);
            }
            Event::MouseButtonReleased { button } => {
                self.pressed_mouse.remove(&button);
            }
            Event::MouseMoved { x, y } => {
                let position = Vec2::new(x, y);
                // The first position has nothing to be relative to.
                if self.has_cursor {
                    self.mouse_delta += position - self.mouse_position;
                }
                self.has_cursor = true;
                self.mouse_position = position;
            }
            Event::MouseScrolled { dx, dy } => {
                self.scroll_delta += Vec2::new(dx, dy);
            }
            Event::WindowResize { width, height, .. } => {
                self.screen_size = Vec2::new(width as f32, height as f32);
            }
            Event::WindowClose { .. } | Event::KeyTyped { .. } => {}
        }
    }

    #[must_use]
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Pressed since the last [`Self::start_frame`].
    #[must_use]
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    #[must_use]
    pub fn is_mouse_button_pressed(&self, button: MouseButton) -> bool {
        self.pressed_mouse.contains(&button)
    }

    #[must_use]
    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    #[must_use]
    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    #[must_use]
    pub fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }

    #[must_use]
    pub fn screen_size(&self) -> Vec2 {
        self.screen_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cursor_position_produces_no_delta() {
        let mut input = Input::new();
        input.on_event(&Event::MouseMoved { x: 100.0, y: 50.0 });
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
        input.on_event(&Event::MouseMoved { x: 110.0, y: 45.0 });
        assert_eq!(input.mouse_delta(), Vec2::new(10.0, -5.0));
        input.start_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn key_state_follows_press_and_release() {
        let mut input = Input::new();
        input.on_event(&Event::KeyPressed {
            key: KeyCode::W,
            repeat_count: 0,
        });
        assert!(input.is_key_pressed(KeyCode::W));
        assert!(input.is_key_just_pressed(KeyCode::W));
        input.start_frame();
        assert!(!input.is_key_just_pressed(KeyCode::W));
        input.on_event(&Event::KeyReleased { key: KeyCode::W });
        assert!(!input.is_key_pressed(KeyCode::W));
    }
}
