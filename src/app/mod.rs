//! Application Layer
//!
//! An [`Application`] owns a [`Window`], a [`Renderer`] and a [`LayerStack`].
//! Each frame it drains the window's events, routes them through the stack
//! (overlays first), advances every layer by the elapsed [`Timestep`] and
//! presents.
//!
//! Platform glue lives behind the `winit` feature; without it an application
//! can still be driven through [`HeadlessWindow`].

pub mod events;
pub mod input;
pub mod window;
#[cfg(feature = "winit")]
pub mod winit;

pub use events::{Event, EventCategory, EventDispatcher, EventType};
pub use input::{Input, KeyCode, MouseButton};
pub use window::{HeadlessWindow, Window};

use crate::errors::Result;
use crate::renderer::api::BackendContext;
use crate::renderer::settings::RendererSettings;
use crate::renderer::Renderer;
use crate::utils::time::{Timer, Timestep};

#[derive(Debug, Clone)]
pub struct ApplicationSpecification {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub settings: RendererSettings,
}

impl Default for ApplicationSpecification {
    fn default() -> Self {
        Self {
            name: "Lumen".into(),
            width: 1280,
            height: 720,
            settings: RendererSettings::default(),
        }
    }
}

/// Shared state a layer sees during a callback.
pub struct LayerContext<'a> {
    pub renderer: &'a Renderer,
    pub input: &'a Input,
}

/// A slice of application behavior. Layers are updated bottom to top and
/// receive events top to bottom.
#[allow(unused_variables)]
pub trait Layer {
    fn name(&self) -> &str;

    fn on_attach(&mut self, ctx: &LayerContext<'_>) {}

    fn on_detach(&mut self) {}

    fn on_update(&mut self, ts: Timestep, ctx: &LayerContext<'_>) {}

    /// Returns `true` when the event was consumed.
    fn on_event(&mut self, event: &Event, ctx: &LayerContext<'_>) -> bool {
        false
    }
}

/// Ordinary layers followed by overlays. Overlays always sit above every
/// ordinary layer regardless of push order.
#[derive(Default)]
pub struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
    insert_index: usize,
}

impl LayerStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_layer(&mut self, layer: Box<dyn Layer>) {
        self.layers.insert(self.insert_index, layer);
        self.insert_index += 1;
    }

    pub fn push_overlay(&mut self, overlay: Box<dyn Layer>) {
        self.layers.push(overlay);
    }

    /// Removes the first ordinary layer called `name`.
    pub fn pop_layer(&mut self, name: &str) -> Option<Box<dyn Layer>> {
        let index = self.layers[..self.insert_index].iter().position(|l| l.name() == name)?;
        self.insert_index -= 1;
        Some(self.layers.remove(index))
    }

    /// Removes the first overlay called `name`.
    pub fn pop_overlay(&mut self, name: &str) -> Option<Box<dyn Layer>> {
        let offset = self.layers[self.insert_index..].iter().position(|l| l.name() == name)?;
        Some(self.layers.remove(self.insert_index + offset))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer names from bottom to top.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Layer> {
        self.layers.iter().map(AsRef::as_ref)
    }

    pub fn on_update(&mut self, ts: Timestep, ctx: &LayerContext<'_>) {
        for layer in &mut self.layers {
            layer.on_update(ts, ctx);
        }
    }

    /// Offers `event` to each layer from the top until one consumes it.
    pub fn on_event(&mut self, event: &Event, ctx: &LayerContext<'_>) -> bool {
        self.layers.iter_mut().rev().any(|layer| layer.on_event(event, ctx))
    }

    fn detach_all(&mut self) {
        for mut layer in self.layers.drain(..).rev() {
            layer.on_detach();
        }
        self.insert_index = 0;
    }
}

pub struct Application {
    spec: ApplicationSpecification,
    window: Box<dyn Window>,
    renderer: Renderer,
    layers: LayerStack,
    input: Input,
    timer: Timer,
    running: bool,
    minimized: bool,
}

impl Application {
    pub fn new(spec: ApplicationSpecification, mut window: Box<dyn Window>, context: BackendContext) -> Result<Self> {
        log::info!("Creating application '{}' ({}x{})", spec.name, spec.width, spec.height);
        let renderer = Renderer::new(spec.settings.clone(), context)?;
        window.set_vsync(spec.settings.vsync);
        let (width, height) = window.size();
        renderer.api().resize_screen(width, height);
        let mut input = Input::new();
        input.on_event(&Event::WindowResize {
            title: window.title().to_owned(),
            width,
            height,
        });
        Ok(Self {
            spec,
            window,
            renderer,
            layers: LayerStack::new(),
            input,
            timer: Timer::new(),
            running: true,
            minimized: false,
        })
    }

    #[must_use]
    pub fn specification(&self) -> &ApplicationSpecification {
        &self.spec
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    #[must_use]
    pub fn input(&self) -> &Input {
        &self.input
    }

    #[must_use]
    pub fn window(&self) -> &dyn Window {
        self.window.as_ref()
    }

    pub fn window_mut(&mut self) -> &mut dyn Window {
        self.window.as_mut()
    }

    #[must_use]
    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn push_layer(&mut self, mut layer: Box<dyn Layer>) {
        layer.on_attach(&LayerContext {
            renderer: &self.renderer,
            input: &self.input,
        });
        self.layers.push_layer(layer);
    }

    pub fn push_overlay(&mut self, mut overlay: Box<dyn Layer>) {
        overlay.on_attach(&LayerContext {
            renderer: &self.renderer,
            input: &self.input,
        });
        self.layers.push_overlay(overlay);
    }

    /// Stops the loop after the current frame.
    pub fn close(&mut self) {
        self.running = false;
    }

    /// Handles window bookkeeping, then offers the event to the layers.
    pub fn on_event(&mut self, event: &Event) -> bool {
        self.input.on_event(event);
        match *event {
            Event::WindowClose { .. } => {
                log::info!("Window closed, stopping '{}'", self.spec.name);
                self.running = false;
            }
            Event::WindowResize { width, height, .. } => {
                self.minimized = width == 0 || height == 0;
                if !self.minimized {
                    self.renderer.api().resize_screen(width, height);
                }
            }
            _ => {}
        }
        let ctx = LayerContext {
            renderer: &self.renderer,
            input: &self.input,
        };
        self.layers.on_event(event, &ctx)
    }

    /// Runs one iteration of the main loop. Returns whether the application
    /// is still running.
    pub fn run_frame(&mut self) -> Result<bool> {
        self.renderer.reset_stats();
        for event in self.window.poll_events() {
            self.on_event(&event);
        }
        let ts = self.timer.tick();
        if self.running && !self.minimized {
            let ctx = LayerContext {
                renderer: &self.renderer,
                input: &self.input,
            };
            self.layers.on_update(ts, &ctx);
            self.renderer.api().present()?;
            self.window.swap_buffers();
        }
        self.input.start_frame();
        Ok(self.running)
    }

    /// Loops until a close event arrives or [`Self::close`] is called, then
    /// detaches every layer from the top down.
    pub fn run(&mut self) -> Result<()> {
        let result = loop {
            match self.run_frame() {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.shutdown();
        result
    }

    pub(crate) fn shutdown(&mut self) {
        self.layers.detach_all();
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Layer for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn overlays_stay_above_layers() {
        let mut stack = LayerStack::new();
        stack.push_overlay(Box::new(Named("hud")));
        stack.push_layer(Box::new(Named("world")));
        stack.push_layer(Box::new(Named("debug")));
        assert_eq!(stack.names(), vec!["world", "debug", "hud"]);

        assert!(stack.pop_layer("hud").is_none(), "overlays are not popped as layers");
        assert!(stack.pop_layer("world").is_some());
        stack.push_layer(Box::new(Named("editor")));
        assert_eq!(stack.names(), vec!["debug", "editor", "hud"]);
    }
}
