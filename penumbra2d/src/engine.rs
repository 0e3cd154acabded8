use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use winit::{
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window},
};

use crate::assets::{AssetCache, AssetConfig};
use crate::camera::Camera;
use crate::input::InputState;
use crate::math::{Colour, Vec2};
use crate::render::{DrawList, GpuBackend, Renderer, ShadowConfig, TextRequest, TextureStore};
use crate::world::World;

/// Graphics API to request from wgpu.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    #[default]
    Auto,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl BackendChoice {
    pub fn backends(self) -> wgpu::Backends {
        match self {
            BackendChoice::Auto => wgpu::Backends::all(),
            BackendChoice::Vulkan => wgpu::Backends::VULKAN,
            BackendChoice::Metal => wgpu::Backends::METAL,
            BackendChoice::Dx12 => wgpu::Backends::DX12,
            BackendChoice::Gl => wgpu::Backends::GL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendChoice::Auto => "auto",
            BackendChoice::Vulkan => "vulkan",
            BackendChoice::Metal => "metal",
            BackendChoice::Dx12 => "dx12",
            BackendChoice::Gl => "gl",
        }
    }
}

/// Configuration values for the window and runtime behaviour.
///
/// Every field has a default, so a JSON file only needs to name the values it
/// overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
    pub vsync: bool,
    pub backend: BackendChoice,
    /// 0 disables the cap.
    pub max_fps: u32,
    /// Seconds; longer frames are simulated as this long.
    pub max_delta_time: f32,
    /// Physics substeps per frame.
    pub physics_quality: u32,
    /// World units per second squared, pointing down.
    pub gravity: f32,
    /// Live particles across all emitters; 0 is unlimited.
    pub particle_cap: usize,
    /// World units visible vertically at zoom 1.
    pub world_height: f32,
    pub shadows: ShadowConfig,
    pub assets: AssetConfig,
    pub show_stats: bool,
    /// Font for the stats overlay; without one stats are only logged.
    pub stats_font: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Penumbra2D".into(),
            width: 1280,
            height: 720,
            fullscreen: false,
            resizable: true,
            vsync: true,
            backend: BackendChoice::Auto,
            max_fps: 0,
            max_delta_time: 1.0 / 24.0,
            physics_quality: crate::physics::DEFAULT_QUALITY,
            gravity: crate::physics::DEFAULT_GRAVITY,
            particle_cap: 0,
            world_height: crate::camera::DEFAULT_WORLD_HEIGHT,
            shadows: ShadowConfig::default(),
            assets: AssetConfig::default(),
            show_stats: false,
            stats_font: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid engine configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("In {}", path.display()))
    }

    /// A world whose camera, physics and particle budget follow this config.
    pub fn build_world(&self, width: u32, height: u32) -> World {
        let mut world = World::new(width, height);
        world.camera = Camera::new(width, height).with_world_height(self.world_height);
        world.physics.set_gravity(Vec2::new(0.0, self.gravity));
        world.physics.set_quality(self.physics_quality);
        world.scene.set_particle_cap(self.particle_cap);
        world
    }
}

/// Smoothed frame delta.
///
/// The delta handed to the simulation is the mean of the last three raw frame
/// durations, clamped to `max_delta`.
#[derive(Debug)]
pub struct FrameClock {
    samples: VecDeque<f32>,
    max_delta: f32,
    max_fps: u32,
    last: Instant,
    delta: f32,
}

impl FrameClock {
    const WINDOW: usize = 3;

    pub fn new(max_delta: f32, max_fps: u32) -> Self {
        Self {
            samples: VecDeque::with_capacity(Self::WINDOW),
            max_delta: max_delta.max(f32::EPSILON),
            max_fps,
            last: Instant::now(),
            delta: 0.0,
        }
    }

    /// Record a raw frame duration in seconds and return the smoothed delta.
    pub fn push(&mut self, raw: f32) -> f32 {
        if self.samples.len() == Self::WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(raw.max(0.0));
        let mean = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        self.delta = mean.min(self.max_delta);
        self.delta
    }

    /// Wait out the frame cap, then measure the frame that just ended.
    pub fn tick(&mut self) -> f32 {
        if let Some(budget) = self.frame_budget() {
            let elapsed = self.last.elapsed();
            if elapsed < budget {
                std::thread::sleep(budget - elapsed);
            }
        }
        let now = Instant::now();
        let raw = (now - self.last).as_secs_f32();
        self.last = now;
        self.push(raw)
    }

    pub fn frame_budget(&self) -> Option<Duration> {
        (self.max_fps > 0).then(|| Duration::from_secs_f64(1.0 / self.max_fps as f64))
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    pub fn fps(&self) -> f32 {
        if self.delta > 0.0 {
            1.0 / self.delta
        } else {
            0.0
        }
    }
}

/// Wall-clock cost of the simulation and draw-list stages of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTimings {
    pub physics_ms: f32,
    pub draw_ms: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub draw_ms: f32,
    pub physics_ms: f32,
    pub objects: usize,
    pub drawn_objects: usize,
    pub physics_objects: usize,
    pub particles: usize,
    pub particle_cap: usize,
    pub backend: String,
}

impl FrameStats {
    pub fn lines(&self) -> Vec<String> {
        let cap = if self.particle_cap == 0 {
            "unlimited".to_string()
        } else {
            self.particle_cap.to_string()
        };
        vec![
            format!("FPS: {:.0}", self.fps),
            format!("Draw: {:.2} ms", self.draw_ms),
            format!("Physics: {:.2} ms", self.physics_ms),
            format!("Objects: {} ({} drawn)", self.objects, self.drawn_objects),
            format!("Physics objects: {}", self.physics_objects),
            format!("Particles: {} / {}", self.particles, cap),
            format!("Backend: {}", self.backend),
        ]
    }

    /// Queue the stats as text in the window's top-left corner.
    pub fn queue_overlay(&self, world: &mut World, font: &str, line_height: f32) {
        for (row, line) in self.lines().into_iter().enumerate() {
            let position = Vec2::new(8.0, 8.0 + row as f32 * line_height);
            let mut request = TextRequest::new(line, font, position, line_height);
            request.background = Some(Colour::rgba(0, 0, 0, 160));
            world.queue_text(request);
        }
    }
}

/// One frame without presenting it: camera update, physics step with pose
/// sync and particle tick, then the draw list.
pub fn drive_frame(
    world: &mut World,
    assets: &mut AssetCache,
    renderer: &mut Renderer,
    store: &mut dyn TextureStore,
    dt: f32,
) -> Result<(DrawList, FrameTimings)> {
    world.camera.update(&world.scene);

    let start = Instant::now();
    world.advance(dt);
    let physics_ms = start.elapsed().as_secs_f32() * 1000.0;

    let start = Instant::now();
    let list = renderer.draw_frame(world, assets, store)?;
    let draw_ms = start.elapsed().as_secs_f32() * 1000.0;

    Ok((
        list,
        FrameTimings {
            physics_ms,
            draw_ms,
        },
    ))
}

/// Main entrypoint for running a game.
pub struct Engine {
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    /// Initial window size in logical pixels.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.config.vsync = vsync;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the game until the window is closed or the game requests exit.
    pub fn run<G: Game + 'static>(self, mut game: G) -> Result<()> {
        let config = self.config;

        let event_loop = EventLoop::new()?;
        let mut window_attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);
        if config.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = event_loop.create_window(window_attributes)?;

        // The window lives for the rest of the program.
        let window: &'static Window = Box::leak(Box::new(window));
        log::info!("Created window '{}'", config.title);

        let mut ctx = EngineContext::new(window, config)?;
        game.init(&mut ctx)?;

        event_loop.run(move |event, elwt| match event {
            Event::NewEvents(_) => {
                ctx.input.begin_frame();
            }
            Event::WindowEvent { event, .. } => {
                ctx.input.handle_window_event(&event);

                match event {
                    WindowEvent::CloseRequested => {
                        elwt.exit();
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if is_escape_pressed(&event) {
                            elwt.exit();
                        }
                    }
                    WindowEvent::MouseInput {
                        state: ElementState::Pressed,
                        button: MouseButton::Left,
                        ..
                    } => {
                        let pointer = ctx.input.pointer();
                        ctx.world.gui.click(pointer);
                    }
                    WindowEvent::Resized(new_size) => {
                        ctx.resize(new_size);
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(err) = ctx.frame(&mut game) {
                            log::error!("Encountered error during frame: {err:?}");
                            elwt.exit();
                            return;
                        }
                        if ctx.exit_requested {
                            elwt.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                ctx.window.request_redraw();
            }
            _ => {}
        })?;

        Ok(())
    }
}

fn is_escape_pressed(event: &KeyEvent) -> bool {
    event.state == ElementState::Pressed
        && matches!(event.physical_key, PhysicalKey::Code(KeyCode::Escape))
}

/// Shared state handed to game code each frame.
pub struct EngineContext<'window> {
    window: &'window Window,
    config: EngineConfig,
    pub world: World,
    pub assets: AssetCache,
    pub input: InputState,
    pub renderer: Renderer,
    backend: Option<GpuBackend<'window>>,
    clock: FrameClock,
    stats: FrameStats,
    exit_requested: bool,
}

impl<'window> EngineContext<'window> {
    fn new(window: &'window Window, config: EngineConfig) -> Result<Self> {
        let size = window.inner_size();
        let mut backend = GpuBackend::new(window, config.vsync, config.backend.backends())?;
        let mut assets = AssetCache::new(config.assets.clone());
        assets.init(&mut backend)?;
        log::info!(
            "Assets from {} (backend: {}, adapter: {})",
            config.assets.root.display(),
            config.backend.name(),
            backend.adapter_name()
        );

        Ok(Self {
            window,
            world: config.build_world(size.width, size.height),
            assets,
            input: InputState::new(),
            renderer: Renderer::new(size.width, size.height, config.shadows.clone()),
            backend: Some(backend),
            clock: FrameClock::new(config.max_delta_time, config.max_fps),
            stats: FrameStats {
                backend: config.backend.name().to_string(),
                particle_cap: config.particle_cap,
                ..FrameStats::default()
            },
            exit_requested: false,
            config,
        })
    }

    fn frame<G: Game>(&mut self, game: &mut G) -> Result<()> {
        let dt = self.clock.tick();
        game.update(self, dt)?;
        game.draw_ui(self)?;

        if self.config.show_stats {
            match &self.config.stats_font {
                Some(font) => self.stats.queue_overlay(&mut self.world, font, 18.0),
                None => log::trace!("{}", self.stats.lines().join(", ")),
            }
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| anyhow!("Graphics backend not available"))?;
        let (list, timings) = drive_frame(
            &mut self.world,
            &mut self.assets,
            &mut self.renderer,
            &mut *backend,
            dt,
        )?;
        backend.render(&list)?;

        self.stats.fps = self.clock.fps();
        self.stats.physics_ms = timings.physics_ms;
        self.stats.draw_ms = timings.draw_ms;
        self.stats.objects = self.world.scene.len();
        self.stats.drawn_objects = self.renderer.drawn_objects();
        self.stats.physics_objects = self.world.physics.body_count();
        self.stats.particles = self.world.scene.particle_count();
        Ok(())
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(new_size);
        }
        self.renderer.resize(new_size.width, new_size.height);
        let (gx, gy) = self.world.window_resized(new_size.width, new_size.height);
        log::debug!(
            "Resized to {}x{} (gui x{:.3}, x{:.3})",
            new_size.width,
            new_size.height,
            gx,
            gy
        );
    }

    /// Tear down the GPU backend and rebuild it on another graphics API.
    ///
    /// In-flight loads are joined first; every texture is re-uploaded lazily
    /// on the new backend.
    pub fn switch_backend(&mut self, choice: BackendChoice) -> Result<()> {
        log::info!(
            "Switching backend from {} to {}",
            self.config.backend.name(),
            choice.name()
        );
        self.assets.reset();
        self.backend = None;
        let mut backend = GpuBackend::new(self.window, self.config.vsync, choice.backends())?;
        self.assets.init(&mut backend)?;
        log::info!("Backend {} ready on {}", choice.name(), backend.adapter_name());
        self.backend = Some(backend);
        self.config.backend = choice;
        self.stats.backend = choice.name().to_string();
        Ok(())
    }

    pub fn window(&self) -> &Window {
        self.window
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Smoothed delta of the current frame, in seconds.
    pub fn delta_time(&self) -> f32 {
        self.clock.delta()
    }

    pub fn backend(&mut self) -> Result<&mut GpuBackend<'window>> {
        self.backend
            .as_mut()
            .ok_or_else(|| anyhow!("Graphics backend not available"))
    }

    /// Pointer position in world units.
    pub fn pointer_world(&self) -> Vec2 {
        self.input.pointer_world(&self.world.camera)
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }
}

/// Hooks into the engine lifecycle.
pub trait Game {
    /// Called once after the window and backend exist.
    fn init(&mut self, _ctx: &mut EngineContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once per frame with the smoothed delta, before the world steps.
    fn update(&mut self, ctx: &mut EngineContext<'_>, dt: f32) -> Result<()>;

    /// Queue text or adjust the GUI before the frame is drawn.
    fn draw_ui(&mut self, _ctx: &mut EngineContext<'_>) -> Result<()> {
        Ok(())
    }
}
