//! Window and input events.
//!
//! Events are produced by the windowing side and routed through the layer
//! stack top to bottom. A handler marks an event handled through
//! [`EventDispatcher`], which stops propagation.

use std::fmt;

use bitflags::bitflags;

use crate::app::input::{KeyCode, MouseButton};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventCategory: u8 {
        const APPLICATION = 1 << 0;
        const INPUT = 1 << 1;
        const KEYBOARD = 1 << 2;
        const MOUSE = 1 << 3;
        const MOUSE_BUTTON = 1 << 4;
    }
}

/// Discriminant of [`Event`], for dispatch by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    WindowResize,
    WindowClose,
    KeyPressed,
    KeyReleased,
    KeyTyped,
    MouseButtonPressed,
    MouseButtonReleased,
    MouseMoved,
    MouseScrolled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    WindowResize { title: String, width: u32, height: u32 },
    WindowClose { title: String },
    KeyPressed { key: KeyCode, repeat_count: u32 },
    KeyReleased { key: KeyCode },
    KeyTyped { key: KeyCode },
    MouseButtonPressed { button: MouseButton },
    MouseButtonReleased { button: MouseButton },
    MouseMoved { x: f32, y: f32 },
    MouseScrolled { dx: f32, dy: f32 },
}

impl Event {
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::WindowResize { .. } => EventType::WindowResize,
            Self::WindowClose { .. } => EventType::WindowClose,
            Self::KeyPressed { .. } => EventType::KeyPressed,
            Self::KeyReleased { .. } => EventType::KeyReleased,
            Self::KeyTyped { .. } => EventType::KeyTyped,
            Self::MouseButtonPressed { .. } => EventType::MouseButtonPressed,
            Self::MouseButtonReleased { .. } => EventType::MouseButtonReleased,
            Self::MouseMoved { .. } => EventType::MouseMoved,
            Self::MouseScrolled { .. } => EventType::MouseScrolled,
        }
    }

    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self.event_type() {
            EventType::WindowResize | EventType::WindowClose => EventCategory::APPLICATION,
            EventType::KeyPressed | EventType::KeyReleased | EventType::KeyTyped => {
                EventCategory::INPUT | EventCategory::KEYBOARD
            }
            EventType::MouseButtonPressed | EventType::MouseButtonReleased => {
                EventCategory::INPUT | EventCategory::MOUSE | EventCategory::MOUSE_BUTTON
            }
            EventType::MouseMoved | EventType::MouseScrolled => EventCategory::INPUT | EventCategory::MOUSE,
        }
    }

    #[must_use]
    pub fn is_in_category(&self, category: EventCategory) -> bool {
        self.category().intersects(category)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WindowResize { title, width, height } => write!(f, "WindowResize({title}: {width}x{height})"),
            Self::WindowClose { title } => write!(f, "WindowClose({title})"),
            Self::KeyPressed { key, repeat_count } => write!(f, "KeyPressed({key:?}, {repeat_count} repeats)"),
            Self::KeyReleased { key } => write!(f, "KeyReleased({key:?})"),
            Self::KeyTyped { key } => write!(f, "KeyTyped({key:?})"),
            Self::MouseButtonPressed { button } => write!(f, "MouseButtonPressed({button:?})"),
            Self::MouseButtonReleased { button } => write!(f, "MouseButtonReleased({button:?})"),
            Self::MouseMoved { x, y } => write!(f, "MouseMoved({x}, {y})"),
            Self::MouseScrolled { dx, dy } => write!(f, "MouseScrolled({dx}, {dy})"),
        }
    }
}

/// Routes one event to typed handlers and remembers whether any of them
/// consumed it.
pub struct EventDispatcher<'a> {
    event: &'a Event,
    handled: bool,
}

impl<'a> EventDispatcher<'a> {
    #[must_use]
    pub fn new(event: &'a Event) -> Self {
        Self { event, handled: false }
    }

    /// Runs `handler` if the event is of type `ty` and still unhandled.
    /// The handler returns whether it consumed the event.
    pub fn dispatch(&mut self, ty: EventType, handler: impl FnOnce(&Event) -> bool) -> bool {
        if self.handled || self.event.event_type() != ty {
            return false;
        }
        self.handled = handler(self.event);
        true
    }

    #[must_use]
    pub fn handled(&self) -> bool {
        self.handled
    }

    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    #[must_use]
    pub fn event(&self) -> &Event {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_matches_type_and_stops_after_handling() {
        let event = Event::MouseScrolled { dx: 0.0, dy: 1.0 };
        let mut dispatcher = EventDispatcher::new(&event);
        assert!(!dispatcher.dispatch(EventType::KeyPressed, |_| true));
        assert!(dispatcher.dispatch(EventType::MouseScrolled, |_| true));
        assert!(dispatcher.handled());
        assert!(!dispatcher.dispatch(EventType::MouseScrolled, |_| false));
    }

    #[test]
    fn mouse_buttons_are_input_and_mouse() {
        let event = Event::MouseButtonPressed {
            button: MouseButton::Left,
        };
        assert!(event.is_in_category(EventCategory::MOUSE));
        assert!(event.is_in_category(EventCategory::INPUT));
        assert!(!event.is_in_category(EventCategory::KEYBOARD));
    }
}
