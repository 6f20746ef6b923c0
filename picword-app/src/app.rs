use crate::engine::{self, UserEvent};
use crate::prompts::{lock, PromptStack};
use ab_glyph::FontVec;
use anyhow::{Context, Result};
use picword_core::Settings;
use picword_experiment::{ExperimentConfig, RunInput, RunOutcome, RunReport, TileBoard};
use picword_render::TileRenderer;
use picword_timing::FrameTimes;
use pixels::{Pixels, SurfaceTexture};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<TileRenderer>,
    font: Option<FontVec>,
    fullscreen: bool,

    prompts: Arc<Mutex<PromptStack>>,
    inputs: Option<mpsc::UnboundedSender<RunInput>>,
    tiles: Option<watch::Receiver<TileBoard>>,
    engine: Option<JoinHandle<()>>,
    report: Option<RunReport>,

    cursor: Option<PhysicalPosition<f64>>,
    frames: FrameTimes,
    refresh_rate: Option<f64>,
}

impl App {
    pub fn new(font: Option<FontVec>, fullscreen: bool) -> Self {
        Self {
            window: None,
            pixels: None,
            renderer: None,
            font,
            fullscreen,
            prompts: Arc::new(Mutex::new(PromptStack::default())),
            inputs: None,
            tiles: None,
            engine: None,
            report: None,
            cursor: None,
            frames: FrameTimes::default(),
            refresh_rate: None,
        }
    }

    /// Runs the window until the run ends or the window is closed.
    pub fn run(mut self, settings: Settings) -> Result<()> {
        let event_loop = EventLoop::<UserEvent>::with_user_event().build()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "starting picword"
        );

        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        self.inputs = Some(inputs);
        self.engine = Some(
            engine::spawn(
                settings,
                ExperimentConfig::default(),
                inputs_rx,
                Arc::clone(&self.prompts),
                event_loop.create_proxy(),
            )
            .context("starting the engine thread")?,
        );

        let result = event_loop.run_app(&mut self);

        // A run still in progress sees its input close and aborts.
        self.inputs = None;
        if let Some(engine) = self.engine.take() {
            if engine.join().is_err() {
                error!("engine thread panicked");
            }
        }
        result?;

        match self.report.take().map(|report| report.outcome) {
            Some(RunOutcome::Failed(err)) => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next());
        self.refresh_rate = monitor
            .as_ref()
            .and_then(|m| m.refresh_rate_millihertz())
            .map(|rate| rate as f64 / 1000.0);

        let mut attributes = Window::default_attributes().with_title("picword");
        if self.fullscreen {
            attributes = attributes
                .with_fullscreen(Some(Fullscreen::Borderless(monitor)))
                .with_resizable(false);
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            refresh_hz = ?self.refresh_rate,
            "display configured"
        );

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface_texture)?);
        self.renderer = Some(TileRenderer::new(size.width, size.height, self.font.take())?);

        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let board = match &self.tiles {
            Some(tiles) => tiles.borrow().clone(),
            None => TileBoard::default(),
        };
        let prompt = lock(&self.prompts).top().cloned();

        let started = Instant::now();
        let stats = renderer.render_frame(&board, prompt.as_ref(), pixels.frame_mut())?;
        pixels.render()?;
        let elapsed = started.elapsed();
        self.frames.record_frame(elapsed);

        trace!(
            outer_ms = elapsed.as_secs_f64() * 1e3,
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            frame_ms = stats.total.as_secs_f64() * 1e3,
            "frame"
        );
        Ok(())
    }

    fn send(&self, input: RunInput) {
        if let Some(inputs) = &self.inputs {
            if inputs.send(input).is_err() {
                debug!("run no longer takes input");
            }
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state == ElementState::Pressed {
            self.forward_key(&event.logical_key, event.repeat);
        }
    }

    fn forward_key(&mut self, key: &Key, repeat: bool) {
        // Held keys auto-repeat into the escape combo, but only a fresh
        // press selects, replays or dismisses.
        if let Some(name) = key_name(key) {
            self.send(RunInput::KeyDown {
                key: name,
                at: tokio::time::Instant::now(),
            });
        }
        if repeat {
            return;
        }

        match key.as_ref() {
            Key::Named(NamedKey::Space) => self.dismiss_prompt(),
            Key::Character("1") => self.send(RunInput::Select(0)),
            Key::Character("2") => self.send(RunInput::Select(1)),
            Key::Character("3") => self.send(RunInput::Select(2)),
            Key::Character("r" | "R") => self.send(RunInput::Replay),
            _ => {}
        }
    }

    fn handle_click(&mut self) {
        let (Some(cursor), Some(renderer)) = (self.cursor, &self.renderer) else {
            return;
        };
        if let Some(choice) = renderer
            .layout()
            .choice_at(cursor.x as f32, cursor.y as f32)
        {
            self.send(RunInput::Select(choice));
        }
    }

    fn dismiss_prompt(&mut self) {
        let mut stack = lock(&self.prompts);
        if let Some(kind) = stack.dismiss_top() {
            debug!(?kind, remaining = stack.len(), "prompt dismissed");
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(err) = pixels.resize_surface(size.width, size.height) {
                warn!(%err, "failed to resize surface");
            }
            if let Err(err) = pixels.resize_buffer(size.width, size.height) {
                warn!(%err, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(err) = renderer.resize(size.width, size.height) {
                warn!(%err, "failed to resize renderer");
            }
        }
        info!(width = size.width, height = size.height, "display resized");
    }

    fn finish(&mut self, report: RunReport) {
        info!(
            outcome = ?report.outcome,
            trials = report.trials_run,
            of = report.total_trials,
            rows = report.rows_written,
            skipped = report.skipped,
            results = ?report.results_path,
            "run ended"
        );
        let stats = self.frames.calibration_stats();
        info!(
            frames = self.frames.frame_count(),
            avg_ms = stats.average_frame_time_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            max_ms = stats.max_frame_time_ns / 1e6,
            fps = stats.effective_fps,
            "frame timing"
        );
        self.report = Some(report);
    }
}

/// Key name as the escape combo spells it: `Escape`, `Enter`, `q`.
fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Named(named) => Some(format!("{named:?}")),
        Key::Character(text) => Some(text.to_string()),
        _ => None,
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.create_window_and_surface(event_loop) {
                error!(%err, "failed to create window and surface");
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::Tiles(tiles) => self.tiles = Some(tiles),
            UserEvent::PromptsChanged => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            UserEvent::RunEnded(report) => {
                self.finish(report);
                event_loop.exit();
            }
            UserEvent::EngineFailed(reason) => {
                error!(%reason, "engine stopped");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("window closed");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.render() {
                    error!(%err, "render failed");
                    event_loop.exit();
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::CursorMoved { position, .. } => self.cursor = Some(position),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.handle_click(),
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }
}
