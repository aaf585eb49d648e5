//! The presentation scheduler.
//!
//! [`PresentationScheduler`] drives one frame at a time through
//!
//! ```text
//!         begin_frame          begin_rendering
//! Idle ----------------> Acquired ----------> Recording
//!  ^                      |    ^                  |
//!  |                      |    +------------------+
//!  |                      |       end_rendering
//!  |                      | end_frame
//!  |                      v
//!  +---- Presented <--- Submitted
//! ```
//!
//! - `begin_frame` waits on the current frame slot's fence, acquires a
//!   swapchain image (signaling the slot's semaphore), resets the fence,
//!   begins the command buffer and records the enter-render barriers for the
//!   acquired image
//! - `begin_rendering` / `end_rendering` open and close the render scope
//! - `end_frame` records the exit-render barrier, ends the command buffer,
//!   submits it and presents, then advances the frame index
//!
//! Two semaphores chain each frame. Submission waits on the frame slot's
//! semaphore, which acquire signals. Presentation waits on the acquired
//! image's own semaphore, which submission signals.
//!
//! # Stale swapchains
//!
//! Out-of-date, suboptimal or lost surfaces are reported as
//! [`RhiError::SwapchainStale`] and never retried internally. The caller
//! responds with [`PresentationScheduler::rebuild`].
//!
//! # Example
//!
//! ```no_run
//! use vkframe_presentation::{PresentationScheduler, PresentationSettings};
//! use vkframe_rhi::{PresentSurface, RhiError, SharedDevice};
//!
//! # fn example(device: SharedDevice, surface: &dyn PresentSurface) -> Result<(), RhiError> {
//! let mut scheduler = PresentationScheduler::new(device, surface, PresentationSettings::default())?;
//!
//! loop {
//!     let frame = match scheduler.begin_frame() {
//!         Ok(frame) => frame,
//!         Err(e) if e.is_stale() => {
//!             scheduler.rebuild(surface)?;
//!             continue;
//!         }
//!         Err(e) => return Err(e),
//!     };
//!     scheduler.begin_rendering()?;
//!     // ... record draws into frame.command_buffer ...
//!     scheduler.end_rendering()?;
//!     match scheduler.end_frame() {
//!         Err(e) if e.is_stale() => scheduler.rebuild(surface)?,
//!         other => other?,
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, error, info, warn};

use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::surface::SurfaceSupport;
use vkframe_rhi::swapchain::{SwapchainManager, SwapchainRequest};
use vkframe_rhi::{PresentSurface, QueueSubmit, RhiError, RhiResult, SharedDevice, StaleReason};

use crate::attachments::{AttachmentConfig, PersistentAttachments};
use crate::frame_slot::FrameSlotPool;
use crate::render_pass::{RenderPassOrchestrator, RenderTarget};
use crate::settings::{PresentationSettings, SlotPolicy};
use crate::transition::ImageLayoutTransitionPlanner;

/// Where the current frame is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame in progress.
    Idle,
    /// An image is acquired and the command buffer is recording outside a render scope.
    Acquired,
    /// Inside the render scope.
    Recording,
    /// Work submitted, present not yet issued.
    Submitted,
    /// Presented; the frame index advances next.
    Presented,
}

/// Handles of the frame `begin_frame` started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame slot in use (round robin).
    pub frame_index: usize,
    /// Swapchain image the driver handed out.
    pub image_index: u32,
    pub command_buffer: vk::CommandBuffer,
    pub extent: vk::Extent2D,
}

/// Resources tied to one swapchain generation.
struct SwapchainResources {
    planner: ImageLayoutTransitionPlanner,
    attachments: PersistentAttachments,
    swapchain: SwapchainManager,
}

impl SwapchainResources {
    fn render_target(&self, image_index: u32) -> RhiResult<RenderTarget> {
        Ok(RenderTarget {
            extent: self.swapchain.extent(),
            swapchain_view: self.swapchain.slot(image_index)?.view(),
            msaa_view: self.attachments.msaa_color().map(|image| image.view()),
            depth_stencil: self
                .attachments
                .depth_stencil()
                .map(|ds| (ds.image.view(), ds.aspects)),
        })
    }
}

/// Drives acquire, record, submit and present for one surface.
///
/// # Thread Safety
///
/// Single-threaded by design: one caller drives the frame lifecycle, so
/// there is no internal locking.
pub struct PresentationScheduler {
    device: SharedDevice,
    settings: PresentationSettings,
    attachment_config: AttachmentConfig,
    orchestrator: RenderPassOrchestrator,
    /// Declared before `frames` so swapchain resources are released first.
    resources: Option<SwapchainResources>,
    frames: Option<FrameSlotPool>,
    state: FrameState,
    image_index: u32,
    /// The current frame's acquire reported a suboptimal swapchain.
    acquire_suboptimal: bool,
    /// A rebuild failed part way; frames are refused until one succeeds.
    needs_rebuild: bool,
    present_id: u64,
}

impl PresentationScheduler {
    /// Creates the swapchain, persistent attachments, barrier planner and
    /// frame slots for `surface`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::UnsupportedConfiguration`] for an unsupported format,
    ///   present mode, sample count or depth/stencil format
    /// - [`RhiError::SwapchainStale`] if the surface has zero area or is lost
    /// - [`RhiError::ResourceCreation`] if any resource cannot be created;
    ///   nothing is left allocated
    pub fn new(
        device: SharedDevice,
        surface: &dyn PresentSurface,
        settings: PresentationSettings,
    ) -> RhiResult<Self> {
        let attachment_config = AttachmentConfig::resolve(
            device.as_ref(),
            settings.samples,
            settings.depth_stencil_format,
        )?;

        let swapchain = SwapchainManager::new(device.clone(), surface, &swapchain_request(&settings))?;
        let resources = Self::build_resources(&device, attachment_config, swapchain)?;

        let count = slot_count(settings.slot_policy, resources.swapchain.image_count())?;
        let frames = FrameSlotPool::new(device.clone(), count)?;

        info!(
            "Presentation scheduler ready: {} swapchain images, {} frame slots, {:?}",
            resources.swapchain.image_count(),
            count,
            attachment_config
        );

        Ok(Self {
            orchestrator: RenderPassOrchestrator::new(
                settings.clear_color,
                settings.clear_depth,
                settings.clear_stencil,
            ),
            device,
            settings,
            attachment_config,
            resources: Some(resources),
            frames: Some(frames),
            state: FrameState::Idle,
            image_index: 0,
            acquire_suboptimal: false,
            needs_rebuild: false,
            present_id: 0,
        })
    }

    fn build_resources(
        device: &SharedDevice,
        config: AttachmentConfig,
        swapchain: SwapchainManager,
    ) -> RhiResult<SwapchainResources> {
        let attachments = PersistentAttachments::new(
            device,
            config,
            swapchain.surface_format().format,
            swapchain.extent(),
        )?;
        let planner = ImageLayoutTransitionPlanner::from_attachments(&attachments);
        Ok(SwapchainResources {
            planner,
            attachments,
            swapchain,
        })
    }

    // ========================================================================
    // Frame lifecycle
    // ========================================================================

    /// Starts a frame.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidState`] if a frame is already in progress or the
    ///   scheduler was terminated
    /// - [`RhiError::SynchronizationTimeout`] if the frame slot's fence or the
    ///   acquire ran past `fence_timeout_ns`
    /// - [`RhiError::SwapchainStale`] if the swapchain must be rebuilt
    ///
    /// On any error the scheduler stays [`FrameState::Idle`] and the frame
    /// slot's fence stays signaled. If recording fails after an image was
    /// acquired, the frame is abandoned: the slot gets fresh sync objects and
    /// later calls report [`StaleReason::OutOfDate`] until a rebuild.
    pub fn begin_frame(&mut self) -> RhiResult<FrameInfo> {
        self.expect_state(FrameState::Idle, "begin_frame")?;
        if self.needs_rebuild {
            return Err(RhiError::SwapchainStale(StaleReason::OutOfDate));
        }

        let timeout = self.settings.fence_timeout_ns;
        let (frames, resources) = self.parts()?;
        let slot = frames.current();

        slot.wait(timeout)?;
        let acquired = resources
            .swapchain
            .acquire_next_image(slot.wait_semaphore(), timeout)?;

        // Only reset the fence once work is guaranteed to be submitted with it
        let recorded = slot.begin_recording().and_then(|()| {
            let image = resources.swapchain.slot(acquired.index)?.image();
            slot.command_buffer()
                .pipeline_barrier2(&resources.planner.enter_render(image));
            Ok(FrameInfo {
                frame_index: frames.frame_index(),
                image_index: acquired.index,
                command_buffer: slot.command_buffer().handle(),
                extent: resources.swapchain.extent(),
            })
        });
        let info = match recorded {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to begin recording image {}: {}", acquired.index, e);
                self.abandon_frame();
                return Err(e);
            }
        };

        if acquired.suboptimal {
            debug!("Acquired image {} from a suboptimal swapchain", acquired.index);
        }
        debug!(
            "Frame {} acquired image {}",
            info.frame_index, info.image_index
        );

        self.image_index = acquired.index;
        self.acquire_suboptimal = acquired.suboptimal;
        self.state = FrameState::Acquired;
        Ok(info)
    }

    /// Opens the render scope for the acquired image.
    pub fn begin_rendering(&mut self) -> RhiResult<()> {
        self.expect_state(FrameState::Acquired, "begin_rendering")?;
        let (frames, resources) = self.parts()?;
        let target = resources.render_target(self.image_index)?;

        self.orchestrator
            .begin_rendering(frames.current().command_buffer(), &target);
        self.state = FrameState::Recording;
        Ok(())
    }

    /// Closes the render scope.
    pub fn end_rendering(&mut self) -> RhiResult<()> {
        self.expect_state(FrameState::Recording, "end_rendering")?;
        let (frames, _) = self.parts()?;

        self.orchestrator
            .end_rendering(frames.current().command_buffer());
        self.state = FrameState::Acquired;
        Ok(())
    }

    /// Finishes recording, submits and presents the frame.
    ///
    /// Once submission succeeds the frame counts as done: the frame index
    /// advances and the scheduler returns to [`FrameState::Idle`] even if
    /// presentation reports an error.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidState`] unless a frame is acquired and its render
    ///   scope is closed
    /// - [`RhiError::SwapchainStale`] if present reported the swapchain out
    ///   of date, lost, or suboptimal, or the acquire was suboptimal
    pub fn end_frame(&mut self) -> RhiResult<()> {
        self.expect_state(FrameState::Acquired, "end_frame")?;

        if let Err(e) = self.submit_current() {
            error!("Frame submission failed: {}", e);
            self.abandon_frame();
            return Err(e);
        }
        self.state = FrameState::Submitted;

        self.present_id += 1;
        let present_id = self.present_id;
        let image_index = self.image_index;
        let present_result = self
            .parts()
            .and_then(|(_, resources)| resources.swapchain.present(image_index, Some(present_id)));

        self.state = FrameState::Presented;
        self.advance_frame();

        match present_result {
            Ok(false) if !self.acquire_suboptimal => Ok(()),
            Ok(_) => {
                debug!("Swapchain suboptimal after presenting image {}", image_index);
                Err(RhiError::SwapchainStale(StaleReason::Suboptimal))
            }
            Err(e) => {
                if e.is_stale() {
                    debug!("Present of image {} reported {}", image_index, e);
                }
                Err(e)
            }
        }
    }

    /// Moves to the next frame slot and back to [`FrameState::Idle`].
    fn advance_frame(&mut self) {
        if let Some(frames) = self.frames.as_mut() {
            frames.advance();
        }
        self.state = FrameState::Idle;
    }

    fn submit_current(&self) -> RhiResult<()> {
        let (frames, resources) = self.parts()?;
        let slot = frames.current();
        let cmd: &CommandBuffer = slot.command_buffer();
        let image_slot = resources.swapchain.slot(self.image_index)?;

        cmd.pipeline_barrier2(&resources.planner.exit_render(image_slot.image()));
        cmd.end()?;

        let wait = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.wait_semaphore().handle())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(image_slot.signal_semaphore())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let command_buffers = [cmd.handle()];

        self.device
            .queue_submit2(&QueueSubmit {
                wait: &wait,
                command_buffers: &command_buffers,
                signal: &signal,
                fence: slot.fence().handle(),
            })
            .map_err(RhiError::from)
    }

    /// Drops a frame that was acquired but never submitted.
    ///
    /// The acquired image can no longer be presented, so the swapchain is
    /// marked for rebuild, and the slot gets fresh sync objects.
    fn abandon_frame(&mut self) {
        self.state = FrameState::Idle;
        self.needs_rebuild = true;
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle after abandoned frame: {}", e);
        }
        if let Some(frames) = self.frames.as_mut() {
            if let Err(e) = frames.current_mut().recover() {
                error!("Failed to recover frame slot: {}", e);
            }
        }
    }

    // ========================================================================
    // Rebuild and teardown
    // ========================================================================

    /// Rebuilds the swapchain, persistent attachments and barrier planner for
    /// `surface`, applying any pending format, present mode, sample count or
    /// depth/stencil changes.
    ///
    /// Waits for the device to go idle first. The old swapchain is passed as
    /// the recreation hint and its image slots are destroyed after the new
    /// ones exist. Frame slots survive unless they follow the image count and
    /// that count changed.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidState`] if called mid-frame or after terminate
    /// - [`RhiError::SwapchainStale`] if the surface has zero area; retry later
    /// - [`RhiError::UnsupportedConfiguration`] if pending settings are
    ///   unsupported. Nothing is rebuilt, and the pending settings revert to
    ///   the ones in use so later rebuilds can succeed.
    pub fn rebuild(&mut self, surface: &dyn PresentSurface) -> RhiResult<()> {
        self.expect_state(FrameState::Idle, "rebuild")?;
        if self.resources.is_none() {
            return Err(RhiError::InvalidState("scheduler was terminated".to_string()));
        }

        let attachment_config = match self.check_pending_settings(surface) {
            Ok(config) => config,
            Err(e @ RhiError::UnsupportedConfiguration(_)) => {
                warn!("Rejected pending presentation settings: {}", e);
                self.revert_pending_settings();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.device.wait_idle()?;

        let request = swapchain_request(&self.settings);
        let Some(resources) = self.resources.as_mut() else {
            return Err(RhiError::InvalidState("scheduler was terminated".to_string()));
        };
        if let Err(e) =
            Self::rebuild_resources(&self.device, resources, surface, &request, attachment_config)
        {
            warn!("Swapchain rebuild failed: {}", e);
            self.needs_rebuild = true;
            return Err(e);
        }

        let image_count = self.image_count();
        let extent = self.current_extent();
        let wanted = slot_count(self.settings.slot_policy, image_count)?;
        let current = self.frames.as_ref().map_or(0, FrameSlotPool::len);
        if current != wanted as usize {
            info!("Frame slot count {} -> {}", current, wanted);
            // Old slots are idle; drop them before creating the new pool
            self.frames = None;
            match FrameSlotPool::new(self.device.clone(), wanted) {
                Ok(frames) => self.frames = Some(frames),
                Err(e) => {
                    self.needs_rebuild = true;
                    return Err(e);
                }
            }
        }

        info!(
            "Rebuilt presentation for {}x{} with {} images",
            extent.width, extent.height, image_count
        );

        self.attachment_config = attachment_config;
        self.needs_rebuild = false;
        Ok(())
    }

    /// Validates pending format, present mode, samples and depth/stencil
    /// format against `surface` and the device, without touching anything.
    fn check_pending_settings(&self, surface: &dyn PresentSurface) -> RhiResult<AttachmentConfig> {
        let support = SurfaceSupport::query(surface)?;
        support.select_surface_format(self.settings.surface_format)?;
        support.select_present_mode(self.settings.present_mode)?;
        AttachmentConfig::resolve(
            self.device.as_ref(),
            self.settings.samples,
            self.settings.depth_stencil_format,
        )
    }

    /// Puts the rebuild-time settings back to what the live swapchain and
    /// attachments use.
    fn revert_pending_settings(&mut self) {
        if let Some(resources) = self.resources.as_ref() {
            self.settings.surface_format = resources.swapchain.surface_format();
            self.settings.present_mode = resources.swapchain.present_mode();
        }
        self.settings.samples = self.attachment_config.samples();
        self.settings.depth_stencil_format = self.depth_stencil_format();
    }

    /// Recreates the swapchain in place, then attachments and planner for the
    /// new extent. On error the previous generation's pieces stay in place.
    fn rebuild_resources(
        device: &SharedDevice,
        resources: &mut SwapchainResources,
        surface: &dyn PresentSurface,
        request: &SwapchainRequest,
        attachment_config: AttachmentConfig,
    ) -> RhiResult<()> {
        resources.swapchain.recreate(surface, request)?;

        let attachments = PersistentAttachments::new(
            device,
            attachment_config,
            resources.swapchain.surface_format().format,
            resources.swapchain.extent(),
        )?;
        resources.planner = ImageLayoutTransitionPlanner::from_attachments(&attachments);
        resources.attachments = attachments;
        Ok(())
    }

    /// Blocks until the device has finished all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle().map_err(RhiError::from)
    }

    /// Waits for the device to go idle and releases every owned resource.
    ///
    /// Idempotent. Later frame calls return [`RhiError::InvalidState`].
    pub fn terminate(&mut self) {
        if self.resources.is_none() && self.frames.is_none() {
            return;
        }

        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during terminate: {:?}", e);
        }

        self.resources = None;
        self.frames = None;
        self.state = FrameState::Idle;
        info!("Presentation scheduler terminated");
    }

    // ========================================================================
    // Present correlation
    // ========================================================================

    /// Id attached to the most recent present, 0 before the first.
    #[inline]
    pub fn present_id(&self) -> u64 {
        self.present_id
    }

    /// Whether [`wait_for_present`](Self::wait_for_present) is available.
    pub fn supports_present_wait(&self) -> bool {
        self.device.supports_present_wait()
    }

    /// Blocks until the present tagged `present_id` has been displayed.
    ///
    /// # Errors
    ///
    /// - [`RhiError::UnsupportedConfiguration`] without present-wait support
    /// - [`RhiError::SynchronizationTimeout`] if `timeout` nanoseconds pass first
    pub fn wait_for_present(&self, present_id: u64, timeout: u64) -> RhiResult<()> {
        let (_, resources) = self.parts()?;
        resources.swapchain.wait_for_present(present_id, timeout)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Current frame slot, round robin over [`frame_slot_count`](Self::frame_slot_count).
    pub fn frame_index(&self) -> usize {
        self.frames.as_ref().map_or(0, FrameSlotPool::frame_index)
    }

    /// Swapchain image acquired by the last `begin_frame`.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn frame_slot_count(&self) -> usize {
        self.frames.as_ref().map_or(0, FrameSlotPool::len)
    }

    pub fn image_count(&self) -> u32 {
        self.resources
            .as_ref()
            .map_or(0, |r| r.swapchain.image_count())
    }

    /// Command buffer of the frame in progress.
    pub fn command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        if matches!(self.state, FrameState::Idle) {
            return Err(RhiError::InvalidState("no frame in progress".to_string()));
        }
        let (frames, _) = self.parts()?;
        Ok(frames.current().command_buffer().handle())
    }

    /// Extent of the current swapchain, zero after terminate.
    pub fn current_extent(&self) -> vk::Extent2D {
        self.resources
            .as_ref()
            .map_or(vk::Extent2D::default(), |r| r.swapchain.extent())
    }

    /// Format of the current swapchain, or the requested one after terminate.
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.resources
            .as_ref()
            .map_or(self.settings.surface_format, |r| r.swapchain.surface_format())
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.resources
            .as_ref()
            .map_or(self.settings.present_mode, |r| r.swapchain.present_mode())
    }

    /// Depth/stencil format in use, if any.
    pub fn depth_stencil_format(&self) -> Option<vk::Format> {
        self.attachment_config.depth_stencil().map(|t| t.format)
    }

    /// Sample count in use.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.attachment_config.samples()
    }

    pub fn attachment_config(&self) -> AttachmentConfig {
        self.attachment_config
    }

    #[inline]
    pub fn settings(&self) -> &PresentationSettings {
        &self.settings
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Takes effect from the next frame.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.settings.clear_color = color;
        self.orchestrator.set_clear_color(color);
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        self.settings.clear_depth = depth;
        self.orchestrator.set_clear_depth(depth);
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) {
        self.settings.clear_stencil = stencil;
        self.orchestrator.set_clear_stencil(stencil);
    }

    /// Takes effect on the next [`rebuild`](Self::rebuild).
    pub fn set_surface_format(&mut self, surface_format: vk::SurfaceFormatKHR) {
        self.settings.surface_format = surface_format;
    }

    /// Takes effect on the next [`rebuild`](Self::rebuild).
    pub fn set_present_mode(&mut self, present_mode: vk::PresentModeKHR) {
        self.settings.present_mode = present_mode;
    }

    /// Takes effect on the next [`rebuild`](Self::rebuild).
    pub fn set_samples(&mut self, samples: vk::SampleCountFlags) {
        self.settings.samples = samples;
    }

    /// Takes effect on the next [`rebuild`](Self::rebuild). `None` disables
    /// depth and stencil.
    pub fn set_depth_stencil_format(&mut self, format: Option<vk::Format>) {
        self.settings.depth_stencil_format = format;
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn expect_state(&self, expected: FrameState, operation: &str) -> RhiResult<()> {
        if self.state != expected {
            return Err(RhiError::InvalidState(format!(
                "{operation} called in state {:?}, expected {:?}",
                self.state, expected
            )));
        }
        Ok(())
    }

    fn parts(&self) -> RhiResult<(&FrameSlotPool, &SwapchainResources)> {
        match (self.frames.as_ref(), self.resources.as_ref()) {
            (Some(frames), Some(resources)) => Ok((frames, resources)),
            _ => Err(RhiError::InvalidState(
                "scheduler was terminated".to_string(),
            )),
        }
    }
}

impl Drop for PresentationScheduler {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for PresentationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationScheduler")
            .field("state", &self.state)
            .field("frame_index", &self.frame_index())
            .field("image_index", &self.image_index)
            .field("extent", &self.current_extent())
            .field("attachments", &self.attachment_config)
            .field("present_id", &self.present_id)
            .finish()
    }
}

fn swapchain_request(settings: &PresentationSettings) -> SwapchainRequest {
    SwapchainRequest {
        surface_format: settings.surface_format,
        present_mode: settings.present_mode,
        target_min_image_count: settings.target_min_image_count,
        fallback_extent: settings.fallback_extent,
    }
}

fn slot_count(policy: SlotPolicy, image_count: u32) -> RhiResult<u32> {
    match policy.slot_count(image_count) {
        0 => Err(RhiError::UnsupportedConfiguration(
            "frame slot count must be at least 1".to_string(),
        )),
        n => Ok(n),
    }
}
