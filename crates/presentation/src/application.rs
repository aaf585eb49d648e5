//! Application hook and the per-frame driver around it.
//!
//! An [`Application`] only records draw commands. [`FrameRunner`] owns the
//! frame cycle and the stale-swapchain handling:
//!
//! ```text
//! begin_frame -> begin_rendering -> app.update -> end_rendering -> end_frame
//! ```
//!
//! A stale swapchain reported at either end triggers a rebuild for the
//! surface. A zero-area surface defers the rebuild to a later frame.

use ash::vk;
use tracing::{debug, info, warn};

use vkframe_core::Timer;
use vkframe_rhi::{PresentSurface, RhiResult};

use crate::scheduler::PresentationScheduler;

/// Something that draws into the frames a [`PresentationScheduler`] produces.
pub trait Application {
    /// Called once after the scheduler is created.
    fn init(&mut self, scheduler: &PresentationScheduler) -> anyhow::Result<()>;

    /// Records this frame's work into `cmd`, inside the render scope.
    ///
    /// Returns `false` to request exit. The frame is still submitted.
    fn update(&mut self, delta_time: f64, cmd: vk::CommandBuffer) -> bool;

    /// Called once after the device has gone idle, before the scheduler is
    /// torn down.
    fn terminate(&mut self);
}

/// What one [`FrameRunner::run_frame`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was presented.
    Presented,
    /// The swapchain was stale and has been rebuilt.
    Rebuilt,
    /// The swapchain is stale but the surface cannot take a new one yet
    /// (for example a minimised window).
    RebuildDeferred,
    /// The application asked to exit.
    ExitRequested,
}

/// Drives an [`Application`] one frame at a time.
#[derive(Debug, Default)]
pub struct FrameRunner {
    timer: Timer,
}

impl FrameRunner {
    pub fn new() -> Self {
        Self {
            timer: Timer::new(),
        }
    }

    /// Initializes `app` and restarts the frame clock.
    pub fn init<A: Application + ?Sized>(
        &mut self,
        app: &mut A,
        scheduler: &PresentationScheduler,
    ) -> anyhow::Result<()> {
        app.init(scheduler)?;
        self.timer.reset();
        info!("Application initialized");
        Ok(())
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Anything other than a stale swapchain is returned unchanged.
    pub fn run_frame<A: Application + ?Sized>(
        &mut self,
        scheduler: &mut PresentationScheduler,
        surface: &dyn PresentSurface,
        app: &mut A,
    ) -> RhiResult<FrameOutcome> {
        let frame = match scheduler.begin_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_stale() => {
                debug!("begin_frame reported {}", e);
                return Self::rebuild(scheduler, surface);
            }
            Err(e) => return Err(e),
        };

        scheduler.begin_rendering()?;
        let keep_running = app.update(self.timer.delta_secs(), frame.command_buffer);
        scheduler.end_rendering()?;

        let presented = scheduler.end_frame();
        if !keep_running {
            if let Err(e) = presented {
                debug!("Ignoring {} from the final frame", e);
            }
            return Ok(FrameOutcome::ExitRequested);
        }

        match presented {
            Ok(()) => Ok(FrameOutcome::Presented),
            Err(e) if e.is_stale() => {
                debug!("end_frame reported {}", e);
                Self::rebuild(scheduler, surface)
            }
            Err(e) => Err(e),
        }
    }

    fn rebuild(
        scheduler: &mut PresentationScheduler,
        surface: &dyn PresentSurface,
    ) -> RhiResult<FrameOutcome> {
        match scheduler.rebuild(surface) {
            Ok(()) => Ok(FrameOutcome::Rebuilt),
            Err(e) if e.is_stale() => {
                warn!("Rebuild deferred: {}", e);
                Ok(FrameOutcome::RebuildDeferred)
            }
            Err(e) => Err(e),
        }
    }

    /// Waits for the GPU, lets `app` release its resources, then tears the
    /// scheduler down.
    pub fn shutdown<A: Application + ?Sized>(
        &mut self,
        scheduler: &mut PresentationScheduler,
        app: &mut A,
    ) {
        if let Err(e) = scheduler.wait_idle() {
            warn!("Failed to wait for device idle on shutdown: {}", e);
        }
        app.terminate();
        scheduler.terminate();
        info!(
            "Shut down after {} frames ({:.1} fps average)",
            self.timer.frame_count(),
            self.timer.average_fps()
        );
    }

    /// Frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.timer.frame_count()
    }
}
