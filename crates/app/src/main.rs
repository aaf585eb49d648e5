//! vkframe - clear-screen demo
//!
//! Opens a window, brings up the presentation engine on it and clears the
//! screen every frame with a slowly cycling color. Escape or closing the
//! window exits.
//!
//! The configuration file comes from `VKFRAME_CONFIG` or the first argument;
//! without either the defaults are used.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use vkframe_core::EngineConfig;
use vkframe_platform::{Surface, Window};
use vkframe_presentation::{
    Application, FrameOutcome, FrameRunner, PresentationScheduler, PresentationSettings,
};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::surface::SurfaceBinding;

/// Clears the screen; the render scope does all the work.
struct ClearScreen {
    elapsed: f64,
}

impl ClearScreen {
    fn new() -> Self {
        Self { elapsed: 0.0 }
    }

    /// Color for the next frame, drifting slowly around the hue circle.
    fn clear_color(&self) -> [f32; 4] {
        let t = self.elapsed as f32 * 0.25;
        let channel = |phase: f32| 0.5 + 0.5 * (t + phase).sin();
        [channel(0.0) * 0.3, channel(2.1) * 0.3, channel(4.2) * 0.3, 1.0]
    }
}

impl Application for ClearScreen {
    fn init(&mut self, scheduler: &PresentationScheduler) -> Result<()> {
        let extent = scheduler.current_extent();
        info!(
            "Clearing {}x{} {:?} with {:?}, {} frame slots",
            extent.width,
            extent.height,
            scheduler.surface_format().format,
            scheduler.present_mode(),
            scheduler.frame_slot_count()
        );
        Ok(())
    }

    fn update(&mut self, delta_time: f64, _cmd: vk::CommandBuffer) -> bool {
        self.elapsed += delta_time;
        true
    }

    fn terminate(&mut self) {
        debug!("Clear screen ran for {:.1}s", self.elapsed);
    }
}

/// Vulkan objects for one window, declared in teardown order.
struct Runtime {
    scheduler: PresentationScheduler,
    binding: SurfaceBinding,
    surface: Surface,
    instance: Instance,
}

impl Runtime {
    fn new(window: &Window, config: &EngineConfig) -> Result<Self> {
        let extensions = window.required_extensions()?;
        let instance = Instance::new(config.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let binding = SurfaceBinding::new(&instance, surface.handle(), physical_device.device);
        let device: Arc<Device> = Device::new(&instance, &physical_device)?;

        let settings = PresentationSettings::from_config(&config.presentation, window.extent())?;
        let scheduler = PresentationScheduler::new(device, &binding, settings)
            .context("Failed to create presentation scheduler")?;

        Ok(Self {
            scheduler,
            binding,
            surface,
            instance,
        })
    }
}

struct App {
    config: EngineConfig,
    /// Declared before `window` so the surface goes before the window it was made for.
    runtime: Option<Runtime>,
    window: Option<Window>,
    application: ClearScreen,
    runner: FrameRunner,
    /// The window size changed since the last frame.
    resized: bool,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            runtime: None,
            window: None,
            application: ClearScreen::new(),
            runner: FrameRunner::new(),
            resized: false,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let runtime = Runtime::new(&window, &self.config)?;
        self.runner.init(&mut self.application, &runtime.scheduler)?;

        debug!(
            "Surface {:?}, validation {}",
            runtime.surface.handle(),
            runtime.instance.has_validation()
        );
        info!("Initialization complete, entering main loop");
        self.runtime = Some(runtime);
        self.window = Some(window);
        Ok(())
    }

    /// Runs one frame; returns false once the loop should stop.
    fn redraw(&mut self) -> bool {
        let (Some(window), Some(runtime)) = (self.window.as_ref(), self.runtime.as_mut()) else {
            return true;
        };
        if window.is_minimized() {
            return true;
        }

        if std::mem::take(&mut self.resized) {
            match runtime.scheduler.rebuild(&runtime.binding) {
                Ok(()) => {}
                Err(e) if e.is_stale() => {
                    debug!("Resize rebuild deferred: {}", e);
                    self.resized = true;
                    return true;
                }
                Err(e) => {
                    error!("Failed to rebuild after resize: {}", e);
                    return false;
                }
            }
        }

        runtime
            .scheduler
            .set_clear_color(self.application.clear_color());

        match self
            .runner
            .run_frame(&mut runtime.scheduler, &runtime.binding, &mut self.application)
        {
            Ok(FrameOutcome::Presented) => true,
            Ok(FrameOutcome::Rebuilt) => {
                debug!("Swapchain rebuilt");
                true
            }
            Ok(FrameOutcome::RebuildDeferred) => true,
            Ok(FrameOutcome::ExitRequested) => false,
            Err(e) => {
                error!("Frame failed: {}", e);
                false
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut runtime) = self.runtime.take() {
            self.runner
                .shutdown(&mut runtime.scheduler, &mut self.application);
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            error!("Failed to initialize: {:?}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                self.resized = true;
            }
            WindowEvent::RedrawRequested => {
                if !self.redraw() {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn config_path() -> Option<PathBuf> {
    std::env::var_os("VKFRAME_CONFIG")
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from))
}

fn main() -> Result<()> {
    vkframe_core::init_logging();
    info!("Starting vkframe");

    let path = config_path();
    let config = EngineConfig::load_or_default(path.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    info!(
        "Window {}x{}, present mode {:?}, {}x MSAA",
        config.window.width,
        config.window.height,
        config.presentation.present_mode,
        config.presentation.samples
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
