use anyhow::{Context, Result};
use elink_core::{InputPort, KeyQueue, OperatorKey, RenderPort};
use elink_link::{DeviceLink, SimConfig, SimulatedHost};
use elink_render::{load_font, SkiaRenderer};
use elink_session::{Connector, Progress, SessionConfig, SetupEntry};
use pixels::{Pixels, SurfaceTexture};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

type Session = Connector<SimulatedHost<StdRng>>;

/// Seconds of demo recording after setup returns.
const DEMO_TRIAL_SECS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Setup,
    Recording { frames_left: u32 },
    Finished,
}

fn operator_key(code: KeyCode) -> OperatorKey {
    match code {
        KeyCode::KeyC => OperatorKey::C,
        KeyCode::KeyV => OperatorKey::V,
        KeyCode::KeyD => OperatorKey::D,
        KeyCode::KeyQ => OperatorKey::Q,
        KeyCode::Enter | KeyCode::NumpadEnter => OperatorKey::Enter,
        KeyCode::Escape => OperatorKey::Escape,
        KeyCode::Space => OperatorKey::Space,
        KeyCode::Backspace => OperatorKey::Backspace,
        KeyCode::Delete => OperatorKey::Delete,
        _ => OperatorKey::Other,
    }
}

/// Fullscreen setup and demo recording. Window callbacks only queue keys;
/// each redraw is one session tick.
pub struct App {
    config: SessionConfig,
    file: String,
    seed: Option<u64>,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    session: Option<Session>,
    keys: KeyQueue,
    stage: Stage,
    current_size: Option<PhysicalSize<u32>>,
    refresh_rate: Option<f64>,

    should_exit: bool,
}

impl App {
    pub fn new(config: SessionConfig, file: String, seed: Option<u64>) -> Result<Self> {
        Ok(Self {
            config,
            file,
            seed,
            window: None,
            pixels: None,
            renderer: None,
            session: None,
            keys: KeyQueue::new(),
            stage: Stage::Setup,
            current_size: None,
            refresh_rate: None,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(arch = std::env::consts::ARCH, "C calibrate, V validate, Enter/Q leave setup");
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("elink")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.current_size = Some(physical_size);
        info!(
            width = physical_size.width,
            height = physical_size.height,
            scale = window.scale_factor(),
            refresh_hz = self.refresh_rate,
            "display configured"
        );

        let surface_texture = SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(physical_size.width, physical_size.height, surface_texture)?);

        let font = match &self.config.font {
            Some(path) => Some(load_font(path)?),
            None => None,
        };
        let renderer = SkiaRenderer::new(
            physical_size.width,
            physical_size.height,
            Default::default(),
            self.config.palette.clone(),
            font,
        )?;
        self.start_session(&renderer)?;
        self.renderer = Some(renderer);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    fn start_session(&mut self, renderer: &SkiaRenderer) -> Result<()> {
        let geometry = renderer.display_geometry();
        let mut session = match self.seed {
            Some(seed) => {
                let host = SimulatedHost::with_rng(SimConfig::default(), StdRng::seed_from_u64(seed));
                let link = DeviceLink::with_host(host, &self.config.host, &self.config.prefix);
                Connector::new(link, self.config.clone(), geometry)?
            }
            None => Connector::connect(self.config.clone(), geometry)?,
        };
        let name = session
            .open_file(&self.file)
            .with_context(|| format!("opening data file '{}'", self.file))?;
        info!(file = %name, "data file open");
        session.begin_setup(SetupEntry::Menu)?;
        self.session = Some(session);
        self.stage = Stage::Setup;
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(session), Some(renderer), Some(pixels)) =
            (self.session.as_mut(), self.renderer.as_mut(), self.pixels.as_mut())
        else {
            return Ok(());
        };

        let mut finished = false;
        match self.stage {
            Stage::Setup => {
                if let Progress::Finished(status) = session.tick(renderer, &mut self.keys)? {
                    info!(
                        %status,
                        calibrated = session.calibrated(),
                        validated = session.validated(),
                        "setup returned"
                    );
                    session.start_recording("demo")?;
                    self.stage = Stage::Recording {
                        frames_left: DEMO_TRIAL_SECS * self.config.render_fps,
                    };
                }
            }
            Stage::Recording { frames_left } => {
                let aborted = self.keys.drain_keys().any(|key| key.is_abort());
                let gaze = session.eye_sample()?;
                match gaze.left().or(gaze.right()) {
                    Some(sample) => {
                        let (x, y) = sample.gaze();
                        renderer.draw_target(x, y, true);
                    }
                    None => renderer.draw_target(0.0, 0.0, false),
                }
                if aborted || frames_left == 0 {
                    finished = true;
                } else {
                    self.stage = Stage::Recording {
                        frames_left: frames_left - 1,
                    };
                }
            }
            Stage::Finished => return Ok(()),
        }

        renderer.present()?;
        let frame = pixels.frame_mut();
        if frame.len() == renderer.frame().len() {
            frame.copy_from_slice(renderer.frame());
        }
        pixels.render()?;

        if finished {
            self.finish_session();
        }
        Ok(())
    }

    /// Stops recording, downloads the data file and disconnects. Failures are
    /// logged; the session is gone afterwards either way.
    fn finish_session(&mut self) {
        self.stage = Stage::Finished;
        let Some(mut session) = self.session.take() else {
            return;
        };
        if session.is_recording() {
            if let Err(err) = session.stop_recording() {
                warn!(%err, "stop recording failed");
            }
        }
        match session.close_and_download() {
            Ok(path) => info!(path = %path.display(), "data file downloaded"),
            Err(err) => warn!(%err, "data file not downloaded"),
        }
        if let Err(err) = session.close() {
            warn!(%err, "disconnect failed");
        }
        self.should_exit = true;
    }

    fn handle_input(&mut self, key: PhysicalKey) {
        if let PhysicalKey::Code(code) = key {
            self.keys.push(operator_key(code));
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if self.current_size == Some(new_size) {
            return;
        }
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                warn!(%e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                warn!(%e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                warn!("failed to resize canvas: {e:#}");
            }
        }
        info!(width = new_size.width, height = new_size.height, "display resized");
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.finish_session();
        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!("failed to start: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    error!("frame failed: {e:#}");
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if self.should_exit {
                    self.cleanup_and_exit(event_loop);
                } else if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                self.handle_input(event.physical_key);
            }
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}
