//! Winit platform layer.
//!
//! Translates winit window events into engine [`Event`]s and drives an
//! [`Application`] from winit's event loop. Frames are rendered on
//! `RedrawRequested`; a redraw is requested again whenever the loop goes
//! idle.
//!
//! ```rust,ignore
//! use lumen::app::{ApplicationSpecification, winit};
//!
//! fn main() -> lumen::errors::Result<()> {
//!     lumen::init_logging();
//!     winit::run(ApplicationSpecification::default(), |app| {
//!         app.push_layer(Box::new(SandboxLayer::default()));
//!         Ok(())
//!     })
//! }
//! ```

use std::any::Any;
use std::sync::Arc;

use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle};
use smallvec::SmallVec;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::WindowId;

use crate::app::events::Event;
use crate::app::input::{KeyCode, MouseButton};
use crate::app::window::Window;
use crate::app::{Application, ApplicationSpecification};
use crate::errors::{LumenError, Result};
use crate::renderer::api::{BackendContext, GraphicsApi};
use crate::renderer::backend::metal::WgpuContext;

/// Maps a physical key to the engine key set.
#[must_use]
pub fn translate_key(physical_key: PhysicalKey) -> Option<KeyCode> {
    let PhysicalKey::Code(code) = physical_key else {
        return None;
    };

    let key = match code {
        WinitKey::KeyA => KeyCode::A,
        WinitKey::KeyB => KeyCode::B,
        WinitKey::KeyC => KeyCode::C,
        WinitKey::KeyD => KeyCode::D,
        WinitKey::KeyE => KeyCode::E,
        WinitKey::KeyF => KeyCode::F,
        WinitKey::KeyG => KeyCode::G,
        WinitKey::KeyH => KeyCode::H,
        WinitKey::KeyI => KeyCode::I,
        WinitKey::KeyJ => KeyCode::J,
        WinitKey::KeyK => KeyCode::K,
        WinitKey::KeyL => KeyCode::L,
        WinitKey::KeyM => KeyCode::M,
        WinitKey::KeyN => KeyCode::N,
        WinitKey::KeyO => KeyCode::O,
        WinitKey::KeyP => KeyCode::P,
        WinitKey::KeyQ => KeyCode::Q,
        WinitKey::KeyR => KeyCode::R,
        WinitKey::KeyS => KeyCode::S,
        WinitKey::KeyT => KeyCode::T,
        WinitKey::KeyU => KeyCode::U,
        WinitKey::KeyV => KeyCode::V,
        WinitKey::KeyW => KeyCode::W,
        WinitKey::KeyX => KeyCode::X,
        WinitKey::KeyY => KeyCode::Y,
        WinitKey::KeyZ => KeyCode::Z,

        WinitKey::Digit0 => KeyCode::Key0,
        WinitKey::Digit1 => KeyCode::Key1,
        WinitKey::Digit2 => KeyCode::Key2,
        WinitKey::Digit3 => KeyCode::Key3,
        WinitKey::Digit4 => KeyCode::Key4,
        WinitKey::Digit5 => KeyCode::Key5,
        WinitKey::Digit6 => KeyCode::Key6,
        WinitKey::Digit7 => KeyCode::Key7,
        WinitKey::Digit8 => KeyCode::Key8,
        WinitKey::Digit9 => KeyCode::Key9,

        WinitKey::F1 => KeyCode::F1,
        WinitKey::F2 => KeyCode::F2,
        WinitKey::F3 => KeyCode::F3,
        WinitKey::F4 => KeyCode::F4,
        WinitKey::F5 => KeyCode::F5,
        WinitKey::F6 => KeyCode::F6,
        WinitKey::F7 => KeyCode::F7,
        WinitKey::F8 => KeyCode::F8,
        WinitKey::F9 => KeyCode::F9,
        WinitKey::F10 => KeyCode::F10,
        WinitKey::F11 => KeyCode::F11,
        WinitKey::F12 => KeyCode::F12,

        WinitKey::Space => KeyCode::Space,
        WinitKey::Enter => KeyCode::Enter,
        WinitKey::Escape => KeyCode::Escape,
        WinitKey::Backspace => KeyCode::Backspace,
        WinitKey::Tab => KeyCode::Tab,
        WinitKey::Delete => KeyCode::Delete,
        WinitKey::Insert => KeyCode::Insert,
        WinitKey::Home => KeyCode::Home,
        WinitKey::End => KeyCode::End,
        WinitKey::PageUp => KeyCode::PageUp,
        WinitKey::PageDown => KeyCode::PageDown,

        WinitKey::ShiftLeft => KeyCode::ShiftLeft,
        WinitKey::ShiftRight => KeyCode::ShiftRight,
        WinitKey::ControlLeft => KeyCode::ControlLeft,
        WinitKey::ControlRight => KeyCode::ControlRight,
        WinitKey::AltLeft => KeyCode::AltLeft,
        WinitKey::AltRight => KeyCode::AltRight,
        WinitKey::SuperLeft => KeyCode::SuperLeft,
        WinitKey::SuperRight => KeyCode::SuperRight,

        WinitKey::ArrowUp => KeyCode::ArrowUp,
        WinitKey::ArrowDown => KeyCode::ArrowDown,
        WinitKey::ArrowLeft => KeyCode::ArrowLeft,
        WinitKey::ArrowRight => KeyCode::ArrowRight,

        _ => return None,
    };

    Some(key)
}

#[must_use]
pub fn translate_mouse_button(button: winit::event::MouseButton) -> MouseButton {
    use winit::event::MouseButton as W;
    match button {
        W::Left => MouseButton::Left,
        W::Right => MouseButton::Right,
        W::Middle => MouseButton::Middle,
        W::Back => MouseButton::Other(3),
        W::Forward => MouseButton::Other(4),
        W::Other(id) => MouseButton::Other(id),
    }
}

/// Engine events for one winit event. A key press that produces text also
/// yields a [`Event::KeyTyped`].
#[must_use]
pub fn translate_event(event: &WindowEvent, title: &str) -> SmallVec<[Event; 2]> {
    let mut out = SmallVec::new();
    match event {
        WindowEvent::Resized(size) => out.push(Event::WindowResize {
            title: title.to_owned(),
            width: size.width,
            height: size.height,
        }),
        WindowEvent::CloseRequested => out.push(Event::WindowClose { title: title.to_owned() }),
        WindowEvent::KeyboardInput { event, .. } => {
            let Some(key) = translate_key(event.physical_key) else {
                return out;
            };
            match event.state {
                ElementState::Pressed => {
                    out.push(Event::KeyPressed {
                        key,
                        repeat_count: u32::from(event.repeat),
                    });
                    if event.text.is_some() {
                        out.push(Event::KeyTyped { key });
                    }
                }
                ElementState::Released => out.push(Event::KeyReleased { key }),
            }
        }
        WindowEvent::MouseInput { state, button, .. } => {
            let button = translate_mouse_button(*button);
            out.push(match state {
                ElementState::Pressed => Event::MouseButtonPressed { button },
                ElementState::Released => Event::MouseButtonReleased { button },
            });
        }
        WindowEvent::CursorMoved { position, .. } => out.push(Event::MouseMoved {
            x: position.x as f32,
            y: position.y as f32,
        }),
        WindowEvent::MouseWheel { delta, .. } => {
            let (dx, dy) = match delta {
                MouseScrollDelta::LineDelta(x, y) => (*x, *y),
                // Roughly one line per 20 pixels.
                MouseScrollDelta::PixelDelta(pos) => (pos.x as f32 / 20.0, pos.y as f32 / 20.0),
            };
            out.push(Event::MouseScrolled { dx, dy });
        }
        _ => {}
    }
    out
}

/// A winit window behind the engine [`Window`] trait.
pub struct WinitWindow {
    window: Arc<winit::window::Window>,
    title: String,
    vsync: bool,
}

impl WinitWindow {
    #[must_use]
    pub fn new(window: Arc<winit::window::Window>, title: impl Into<String>, vsync: bool) -> Self {
        Self {
            window,
            title: title.into(),
            vsync,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &Arc<winit::window::Window> {
        &self.window
    }
}

impl HasWindowHandle for WinitWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WinitWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl Window for WinitWindow {
    fn title(&self) -> &str {
        &self.title
    }

    fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn scale_factor(&self) -> f32 {
        self.window.scale_factor() as f32
    }

    // The surface present mode is fixed when the context is created.
    fn set_vsync(&mut self, enabled: bool) {
        if enabled != self.vsync {
            log::warn!("VSync changes take effect the next time the surface is created");
        }
        self.vsync = enabled;
    }

    fn is_vsync(&self) -> bool {
        self.vsync
    }

    fn swap_buffers(&mut self) {
        self.window.pre_present_notify();
    }

    // Winit hands events to the runner directly.
    fn poll_events(&mut self) -> Vec<Event> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type Setup = Box<dyn FnOnce(&mut Application) -> Result<()>>;

struct Runner {
    spec: ApplicationSpecification,
    setup: Option<Setup>,
    app: Option<Application>,
    error: Option<LumenError>,
}

impl Runner {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: LumenError) {
        log::error!("Fatal application error: {error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn create_application(&mut self, event_loop: &ActiveEventLoop) -> Result<Application> {
        let attributes = winit::window::Window::default_attributes()
            .with_title(&self.spec.name)
            .with_inner_size(winit::dpi::PhysicalSize::new(self.spec.width, self.spec.height));
        let window = event_loop
            .create_window(attributes)
            .map(Arc::new)
            .map_err(|e| LumenError::Backend(format!("failed to create window: {e}")))?;
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let mut spec = self.spec.clone();
        if spec.settings.api == GraphicsApi::OpenGl {
            log::warn!("Winit windows carry no OpenGL context, rendering through Metal instead");
            spec.settings.api = GraphicsApi::Metal;
        }
        let context = match spec.settings.api {
            GraphicsApi::Headless => BackendContext::Headless { width, height },
            GraphicsApi::None => BackendContext::None,
            _ => {
                log::info!("Initializing renderer backend...");
                let ctx = pollster::block_on(WgpuContext::new(Arc::clone(&window), &spec.settings, width, height))?;
                BackendContext::Metal(ctx)
            }
        };
        let vsync = spec.settings.vsync;
        let title = spec.name.clone();
        Application::new(spec, Box::new(WinitWindow::new(window, title, vsync)), context)
    }
}

impl ApplicationHandler for Runner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }
        let mut app = match self.create_application(event_loop) {
            Ok(app) => app,
            Err(e) => return self.fail(event_loop, e),
        };
        if let Some(setup) = self.setup.take()
            && let Err(e) = setup(&mut app)
        {
            return self.fail(event_loop, e);
        }
        self.app = Some(app);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(app) = self.app.as_mut() else {
            return;
        };
        if let WindowEvent::RedrawRequested = event {
            match app.run_frame() {
                Ok(true) => {}
                Ok(false) => event_loop.exit(),
                Err(e) => self.fail(event_loop, e),
            }
            return;
        }
        let title = app.window().title().to_owned();
        for translated in translate_event(&event, &title) {
            app.on_event(&translated);
        }
        if !app.is_running() {
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(app) = &self.app
            && let Some(window) = app.window().as_any().downcast_ref::<WinitWindow>()
        {
            window.raw().request_redraw();
        }
    }
}

/// Opens a window, builds an [`Application`] for it and runs until the
/// window closes. `setup` runs once the renderer exists.
pub fn run(spec: ApplicationSpecification, setup: impl FnOnce(&mut Application) -> Result<()> + 'static) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut runner = Runner {
        spec,
        setup: Some(Box::new(setup)),
        app: None,
        error: None,
    };
    event_loop.run_app(&mut runner)?;
    if let Some(mut app) = runner.app.take() {
        app.shutdown();
    }
    runner.error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_and_arrow_keys_translate() {
        assert_eq!(translate_key(PhysicalKey::Code(WinitKey::KeyW)), Some(KeyCode::W));
        assert_eq!(translate_key(PhysicalKey::Code(WinitKey::ArrowLeft)), Some(KeyCode::ArrowLeft));
        assert_eq!(translate_key(PhysicalKey::Code(WinitKey::NumLock)), None);
    }

    #[test]
    fn close_request_becomes_window_close() {
        let events = translate_event(&WindowEvent::CloseRequested, "Sandbox");
        assert_eq!(events.as_slice(), &[Event::WindowClose { title: "Sandbox".into() }]);
    }
}
