//! Application Tests
//!
//! Tests for:
//! - Layer and overlay ordering
//! - Event routing top to bottom with consumption
//! - Close and minimize handling in the main loop
//! - Per-frame renderer statistics and window vsync
//! - Input state fed by events

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec4;

use lumen::app::{
    Application, ApplicationSpecification, Event, HeadlessWindow, KeyCode, Layer, LayerContext, MouseButton, Window,
};
use lumen::renderer::api::{BackendContext, GraphicsApi};
use lumen::renderer::RendererSettings;
use lumen::scene::{Camera, RenderPassSpecification, Scene};
use lumen::utils::Timestep;

type Log = Rc<RefCell<Vec<String>>>;

struct Recorder {
    name: &'static str,
    consumes: bool,
    log: Log,
}

impl Recorder {
    fn boxed(name: &'static str, consumes: bool, log: &Log) -> Box<dyn Layer> {
        Box::new(Self {
            name,
            consumes,
            log: Rc::clone(log),
        })
    }
}

impl Layer for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn on_attach(&mut self, _ctx: &LayerContext<'_>) {
        self.log.borrow_mut().push(format!("attach {}", self.name));
    }

    fn on_detach(&mut self) {
        self.log.borrow_mut().push(format!("detach {}", self.name));
    }

    fn on_update(&mut self, _ts: Timestep, _ctx: &LayerContext<'_>) {
        self.log.borrow_mut().push(format!("update {}", self.name));
    }

    fn on_event(&mut self, event: &Event, _ctx: &LayerContext<'_>) -> bool {
        if matches!(event, Event::KeyPressed { .. }) {
            self.log.borrow_mut().push(format!("event {}", self.name));
            return self.consumes;
        }
        false
    }
}

/// Draws a scene with a single clearing pass every update.
#[derive(Default)]
struct SceneLayer {
    scene: Option<Scene>,
}

impl Layer for SceneLayer {
    fn name(&self) -> &str {
        "scene"
    }

    fn on_attach(&mut self, ctx: &LayerContext<'_>) {
        let (width, height) = ctx.renderer.api().screen_size();
        let mut scene =
            Scene::new(ctx.renderer, Camera::perspective(45.0, width, height, 0.1, 100.0)).expect("scene");
        scene
            .add_render_pass("Clear", RenderPassSpecification::new().with_clear(Vec4::ONE, None))
            .expect("pass");
        self.scene = Some(scene);
    }

    fn on_update(&mut self, _ts: Timestep, ctx: &LayerContext<'_>) {
        if let Some(scene) = &self.scene {
            scene.draw(ctx.renderer);
        }
    }
}

fn application(width: u32, height: u32) -> Application {
    application_with(width, height, RendererSettings::default().with_api(GraphicsApi::Headless))
}

fn application_with(width: u32, height: u32, settings: RendererSettings) -> Application {
    let spec = ApplicationSpecification {
        name: "Test".into(),
        width,
        height,
        settings,
    };
    Application::new(
        spec,
        Box::new(HeadlessWindow::new("Test", width, height)),
        BackendContext::Headless { width, height },
    )
    .expect("application")
}

fn window(app: &mut Application) -> &mut HeadlessWindow {
    app.window_mut()
        .as_any_mut()
        .downcast_mut::<HeadlessWindow>()
        .expect("headless window")
}

fn key_press() -> Event {
    Event::KeyPressed {
        key: KeyCode::Space,
        repeat_count: 0,
    }
}

// ============================================================================
// Layer stack
// ============================================================================

#[test]
fn overlays_sit_above_layers() {
    let log = Log::default();
    let mut app = application(16, 16);
    app.push_overlay(Recorder::boxed("hud", false, &log));
    app.push_layer(Recorder::boxed("world", false, &log));
    app.push_layer(Recorder::boxed("tools", false, &log));
    assert_eq!(app.layers().names(), ["world", "tools", "hud"]);
    assert_eq!(*log.borrow(), ["attach hud", "attach world", "attach tools"]);
}

#[test]
fn events_travel_top_down_until_consumed() {
    let log = Log::default();
    let mut app = application(16, 16);
    app.push_layer(Recorder::boxed("world", false, &log));
    app.push_layer(Recorder::boxed("picker", true, &log));
    app.push_overlay(Recorder::boxed("hud", false, &log));
    log.borrow_mut().clear();

    assert!(app.on_event(&key_press()));
    assert_eq!(*log.borrow(), ["event hud", "event picker"], "world never sees the event");
}

#[test]
fn updates_run_bottom_up() {
    let log = Log::default();
    let mut app = application(16, 16);
    app.push_overlay(Recorder::boxed("hud", false, &log));
    app.push_layer(Recorder::boxed("world", false, &log));
    log.borrow_mut().clear();

    assert!(app.run_frame().expect("frame"));
    assert_eq!(*log.borrow(), ["update world", "update hud"]);
    assert_eq!(window(&mut app).frames(), 1);
}

// ============================================================================
// Main loop
// ============================================================================

#[test]
fn close_event_ends_the_loop_and_detaches() {
    let log = Log::default();
    let mut app = application(16, 16);
    app.push_layer(Recorder::boxed("world", false, &log));
    app.push_overlay(Recorder::boxed("hud", false, &log));
    window(&mut app).request_close();

    app.run().expect("run");

    assert!(!app.is_running());
    assert!(app.layers().is_empty());
    let log = log.borrow();
    assert!(!log.iter().any(|entry| entry.starts_with("update")), "no frame runs after close");
    assert_eq!(&log[log.len() - 2..], ["detach hud", "detach world"]);
}

#[test]
fn zero_sized_window_pauses_updates() {
    let log = Log::default();
    let mut app = application(16, 16);
    app.push_layer(Recorder::boxed("world", false, &log));
    log.borrow_mut().clear();

    window(&mut app).push_event(Event::WindowResize {
        title: "Test".into(),
        width: 0,
        height: 0,
    });
    assert!(app.run_frame().expect("frame"));
    assert!(app.is_minimized());
    assert!(log.borrow().is_empty(), "minimized frames skip updates");
    assert_eq!(window(&mut app).frames(), 0);

    window(&mut app).push_event(Event::WindowResize {
        title: "Test".into(),
        width: 32,
        height: 24,
    });
    assert!(app.run_frame().expect("frame"));
    assert!(!app.is_minimized());
    assert_eq!(app.renderer().api().screen_size(), (32, 24));
    assert_eq!(*log.borrow(), ["update world"]);
}

#[test]
fn close_stops_after_the_current_frame() {
    let mut app = application(16, 16);
    app.close();
    assert!(!app.run_frame().expect("frame"));
}

#[test]
fn statistics_cover_a_single_frame() {
    let mut app = application(16, 16);
    app.push_layer(Box::new(SceneLayer::default()));

    for _ in 0..3 {
        assert!(app.run_frame().expect("frame"));
        assert_eq!(app.renderer().stats().render_passes, 1, "counters restart every frame");
    }
}

#[test]
fn vsync_setting_reaches_the_window() {
    let mut app = application_with(
        16,
        16,
        RendererSettings::default()
            .with_api(GraphicsApi::Headless)
            .with_vsync(false),
    );
    assert!(!window(&mut app).is_vsync());

    let mut app = application(16, 16);
    assert!(window(&mut app).is_vsync());
}

// ============================================================================
// Input
// ============================================================================

#[test]
fn input_tracks_keys_and_buttons() {
    let mut app = application(16, 16);
    app.on_event(&key_press());
    app.on_event(&Event::MouseButtonPressed {
        button: MouseButton::Left,
    });
    assert!(app.input().is_key_pressed(KeyCode::Space));
    assert!(app.input().is_mouse_button_pressed(MouseButton::Left));

    app.on_event(&Event::KeyReleased { key: KeyCode::Space });
    assert!(!app.input().is_key_pressed(KeyCode::Space));
}
