//! Platform-independent window interface.
//!
//! The windowing side implements [`Window`]; the application only talks to
//! the trait. Native handles come through `raw-window-handle` so surfaces
//! can be created without knowing the platform type.
//!
//! [`HeadlessWindow`] has no platform window at all: events are queued by
//! hand and presenting only counts frames. Tests and offline tools drive an
//! [`Application`](crate::app::Application) through it.

use std::any::Any;
use std::collections::VecDeque;

use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle};

use crate::app::events::Event;

pub trait Window: HasWindowHandle + HasDisplayHandle {
    fn title(&self) -> &str;

    /// Client-area size in physical pixels.
    fn size(&self) -> (u32, u32);

    fn scale_factor(&self) -> f32 {
        1.0
    }

    fn set_vsync(&mut self, enabled: bool);

    fn is_vsync(&self) -> bool;

    /// Presents the back buffer; blocks on vsync when enabled.
    fn swap_buffers(&mut self);

    /// Events received since the last call, oldest first.
    fn poll_events(&mut self) -> Vec<Event>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A window that exists only in memory.
#[derive(Debug)]
pub struct HeadlessWindow {
    title: String,
    width: u32,
    height: u32,
    vsync: bool,
    pending: VecDeque<Event>,
    frames: u64,
}

impl HeadlessWindow {
    #[must_use]
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            vsync: true,
            pending: VecDeque::new(),
            frames: 0,
        }
    }

    /// Queues `event` for the next poll. Resizes also update the size.
    pub fn push_event(&mut self, event: Event) {
        if let Event::WindowResize { width, height, .. } = event {
            self.width = width;
            self.height = height;
        }
        self.pending.push_back(event);
    }

    /// Queues a close event carrying this window's title.
    pub fn request_close(&mut self) {
        let title = self.title.clone();
        self.push_event(Event::WindowClose { title });
    }

    /// Number of presented frames.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl HasWindowHandle for HeadlessWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl HasDisplayHandle for HeadlessWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl Window for HeadlessWindow {
    fn title(&self) -> &str {
        &self.title
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_vsync(&mut self, enabled: bool) {
        self.vsync = enabled;
    }

    fn is_vsync(&self) -> bool {
        self.vsync
    }

    fn swap_buffers(&mut self) {
        self.frames += 1;
    }

    fn poll_events(&mut self) -> Vec<Event> {
        self.pending.drain(..).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
