//! lumen - interactive viewer.
//!
//! Opens a window, uploads the procedural demo scene and runs one renderer
//! tick per redraw. An optional first argument names the TOML config file
//! (default `lumen.toml`).

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{CursorGrabMode, WindowId};

use lumen_core::{Config, Timer, init_logging};
use lumen_platform::{InputState, Window};
use lumen_renderer::{Renderer, TickOutcome};
use lumen_resources::{SceneModel, demo_scene};
use lumen_scene::ViewerState;

const DEFAULT_CONFIG_PATH: &str = "lumen.toml";

struct App {
    config: Config,
    scene: SceneModel,
    // Dropped before the window it presents to.
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    viewer: ViewerState,
    timer: Timer,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config, scene: SceneModel) -> Self {
        let viewer = ViewerState::new(config.camera.clone());
        Self {
            config,
            scene,
            renderer: None,
            window: None,
            input: InputState::new(),
            viewer,
            timer: Timer::new(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let renderer = Renderer::new(&window, &self.config, &self.scene)
            .context("initializing renderer")?;
        info!(
            "Initialization complete ({} meshes), entering main loop",
            renderer.mesh_count()
        );
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn set_mouse_look(&self, enabled: bool) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let inner = window.inner();
        let result = if enabled {
            inner
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| inner.set_cursor_grab(CursorGrabMode::Locked))
        } else {
            inner.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(e) = result {
            warn!("Cursor grab not available: {}", e);
        }
        inner.set_cursor_visible(!enabled);
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let dt = self.timer.delta_secs();
        let input = self.input.snapshot();
        let was_looking = self.viewer.mouse_look();
        self.viewer.update(&input, dt);
        if self.viewer.mouse_look() != was_looking {
            self.set_mouse_look(self.viewer.mouse_look());
        }

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match renderer.render_frame(&self.viewer) {
            Ok(TickOutcome::Stopped) => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            Ok(_) => {}
            Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("rendering frame")),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.input.handle_window_event(&event) {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let (Some(window), Some(renderer)) = (&self.window, self.renderer.as_mut()) {
                    info!("Window resized to {}x{}", size.width, size.height);
                    renderer.resize(window.extent());
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, config_error) = match Config::load(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_logging(&config.logging);
    if let Some(e) = config_error {
        warn!("Ignoring config {}: {}", config_path, e);
    }
    info!("Starting lumen");

    let scene = demo_scene();
    info!(
        "Demo scene: {} instances, {} triangles",
        scene.instances.len(),
        scene.total_triangle_count()
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, scene);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(err) => Err(err),
        None => {
            info!("Exited cleanly after {} frames", app.timer.frame_count());
            Ok(())
        }
    }
}
