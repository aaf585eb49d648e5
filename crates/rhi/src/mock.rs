//! In-memory GPU device and surface for tests.
//!
//! [`MockDevice`] hands out fake handles, counts live resources and records
//! every command, submission and presentation. It also simulates the parts
//! of Vulkan that frame pacing depends on:
//!
//! - fences complete on submit, after a configurable number of status polls,
//!   or never (to exercise timeouts)
//! - command buffers move through initial, recording, executable and pending
//! - binary semaphores track signal/wait pairing
//! - swapchain images track acquire/present pairing
//!
//! Misuse that the validation layers would report is collected as
//! human-readable [`MockDevice::violations`] instead of panicking, so tests
//! can assert on a clean run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, PresentRequest, PresentSurface, QueueSubmit};
use crate::image::ImageMemory;
use crate::rendering::RenderingInfoBundle;

/// Resource kinds counted by [`MockDevice::live`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockResource {
    Semaphore,
    Fence,
    CommandPool,
    CommandBuffer,
    Image,
    ImageMemory,
    ImageView,
    Swapchain,
}

const ALL_RESOURCES: [MockResource; 8] = [
    MockResource::Semaphore,
    MockResource::Fence,
    MockResource::CommandPool,
    MockResource::CommandBuffer,
    MockResource::Image,
    MockResource::ImageMemory,
    MockResource::ImageView,
    MockResource::Swapchain,
];

/// Command buffer calls that [`MockDevice::fail_next_command`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCommand {
    Reset,
    Begin,
    End,
}

/// Ordered record of device calls that matter to frame pacing.
///
/// Creation and destruction are not recorded; use [`MockDevice::live`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    FenceWait(vk::Fence),
    FenceReset(vk::Fence),
    Acquire {
        semaphore: vk::Semaphore,
        image_index: u32,
    },
    CommandBufferReset(vk::CommandBuffer),
    CommandBufferBegin(vk::CommandBuffer),
    PipelineBarrier(vk::CommandBuffer),
    BeginRendering(vk::CommandBuffer),
    EndRendering(vk::CommandBuffer),
    CommandBufferEnd(vk::CommandBuffer),
    Submit(vk::Fence),
    Present(u32),
    WaitIdle,
}

/// One `vkCmdPipelineBarrier2` call.
#[derive(Debug, Clone)]
pub struct BarrierBatch {
    pub command_buffer: vk::CommandBuffer,
    pub barriers: Vec<vk::ImageMemoryBarrier2<'static>>,
}

/// One `vkCmdBeginRendering` call.
#[derive(Debug, Clone)]
pub struct RenderingRecord {
    pub command_buffer: vk::CommandBuffer,
    pub render_area: vk::Rect2D,
    pub layer_count: u32,
    pub color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    pub depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    pub stencil_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
}

/// One `vkQueueSubmit2` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRecord {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub wait: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
    pub signal: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
    pub fence: vk::Fence,
}

/// One `vkQueuePresentKHR` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentRecord {
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait_semaphore: vk::Semaphore,
    pub present_id: Option<u64>,
}

/// One `vkCreateSwapchainKHR` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainCreation {
    pub swapchain: vk::SwapchainKHR,
    pub min_image_count: u32,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub old_swapchain: vk::SwapchainKHR,
    pub image_usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub clipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: bool,
    /// Status polls left before a submitted fence completes.
    pending: Option<u32>,
    command_buffers: Vec<vk::CommandBuffer>,
}

#[derive(Debug)]
struct SwapchainState {
    images: Vec<vk::Image>,
    acquired: HashSet<u32>,
    next: u32,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u64,
    live: HashMap<MockResource, usize>,
    fail_after: HashMap<MockResource, u32>,

    events: Vec<MockEvent>,
    barrier_batches: Vec<BarrierBatch>,
    renderings: Vec<RenderingRecord>,
    submits: Vec<SubmitRecord>,
    presents: Vec<PresentRecord>,
    swapchain_creations: Vec<SwapchainCreation>,
    violations: Vec<String>,

    semaphores: HashMap<vk::Semaphore, bool>,
    fences: HashMap<vk::Fence, FenceState>,
    pools: HashMap<vk::CommandPool, Vec<vk::CommandBuffer>>,
    command_buffers: HashMap<vk::CommandBuffer, CommandBufferState>,
    rendering_active: HashSet<vk::CommandBuffer>,
    images: HashSet<vk::Image>,
    views: HashSet<vk::ImageView>,
    swapchains: HashMap<vk::SwapchainKHR, SwapchainState>,

    fence_delay: u32,
    hang_fences: bool,
    acquire_sequence: VecDeque<u32>,
    acquire_results: VecDeque<vk::Result>,
    present_results: VecDeque<vk::Result>,
    command_failures: HashMap<MockCommand, vk::Result>,
    submit_failures: VecDeque<vk::Result>,
    max_presented_id: u64,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Applies a pending `fail_creation` for `kind`.
    fn check_creation(&mut self, kind: MockResource) -> VkResult<()> {
        if let Some(remaining) = self.fail_after.get_mut(&kind) {
            if *remaining == 0 {
                self.fail_after.remove(&kind);
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn created(&mut self, kind: MockResource, count: usize) {
        *self.live.entry(kind).or_default() += count;
    }

    fn destroyed(&mut self, kind: MockResource, count: usize) {
        let live = self.live.entry(kind).or_default();
        if *live < count {
            self.violations
                .push(format!("{kind:?} destroyed more often than created"));
        }
        *live = live.saturating_sub(count);
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn complete_fence(&mut self, fence: vk::Fence) {
        let buffers = match self.fences.get_mut(&fence) {
            Some(state) => {
                state.signaled = true;
                state.pending = None;
                std::mem::take(&mut state.command_buffers)
            }
            None => return,
        };
        for buffer in buffers {
            if let Some(state) = self.command_buffers.get_mut(&buffer) {
                if *state == CommandBufferState::Pending {
                    *state = CommandBufferState::Executable;
                }
            }
        }
    }

    fn expect_recording(&mut self, buffer: vk::CommandBuffer, command: &str) {
        match self.command_buffers.get(&buffer) {
            Some(CommandBufferState::Recording) => {}
            Some(state) => {
                let state = *state;
                self.violation(format!("{command} on {buffer:?} in state {state:?}"));
            }
            None => self.violation(format!("{command} on unknown command buffer {buffer:?}")),
        }
    }

    fn signal_semaphore(&mut self, semaphore: vk::Semaphore, by: &str) {
        match self.semaphores.get_mut(&semaphore) {
            Some(signaled) if *signaled => {
                self.violation(format!("{by} signals {semaphore:?} which is already signaled"));
            }
            Some(signaled) => *signaled = true,
            None => self.violation(format!("{by} signals unknown semaphore {semaphore:?}")),
        }
    }

    fn consume_semaphore(&mut self, semaphore: vk::Semaphore, by: &str) {
        match self.semaphores.get_mut(&semaphore) {
            Some(signaled) if *signaled => *signaled = false,
            Some(_) => self.violation(format!(
                "{by} waits on {semaphore:?} with no signal pending"
            )),
            None => self.violation(format!("{by} waits on unknown semaphore {semaphore:?}")),
        }
    }
}

/// A [`GpuDevice`] that records calls instead of talking to a driver.
///
/// Builder methods configure the device before it is shared; the `&self`
/// methods inject failures and inspect recordings at any time.
#[derive(Debug)]
pub struct MockDevice {
    state: Mutex<MockState>,
    limits: vk::PhysicalDeviceLimits,
    unsupported_depth_formats: Vec<vk::Format>,
    present_wait: bool,
    image_count_override: Option<u32>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A device supporting 1x to 8x MSAA, every depth format and present wait.
    pub fn new() -> Self {
        let samples = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: samples,
            framebuffer_depth_sample_counts: samples,
            framebuffer_stencil_sample_counts: samples,
            max_image_dimension2_d: 16384,
            ..Default::default()
        };

        Self {
            state: Mutex::new(MockState::default()),
            limits,
            unsupported_depth_formats: Vec::new(),
            present_wait: true,
            image_count_override: None,
        }
    }

    /// Restricts the framebuffer sample counts.
    pub fn with_sample_counts(mut self, color: vk::SampleCountFlags, depth: vk::SampleCountFlags) -> Self {
        self.limits.framebuffer_color_sample_counts = color;
        self.limits.framebuffer_depth_sample_counts = depth;
        self.limits.framebuffer_stencil_sample_counts = depth;
        self
    }

    /// Reports `format` as unusable for depth/stencil attachments.
    pub fn without_depth_format(mut self, format: vk::Format) -> Self {
        self.unsupported_depth_formats.push(format);
        self
    }

    pub fn without_present_wait(mut self) -> Self {
        self.present_wait = false;
        self
    }

    /// Makes swapchains return `count` images regardless of the requested minimum.
    pub fn with_swapchain_image_count(mut self, count: u32) -> Self {
        self.image_count_override = Some(count);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Failure injection
    // ========================================================================

    /// Fails the creation of `kind` after `successes` more successful creations.
    pub fn fail_creation(&self, kind: MockResource, successes: u32) {
        self.lock().fail_after.insert(kind, successes);
    }

    /// Submitted fences complete after this many status polls, or when waited on.
    /// Zero completes them at submit.
    pub fn set_fence_delay(&self, polls: u32) {
        self.lock().fence_delay = polls;
    }

    /// Submitted fences never complete; waits time out.
    pub fn hang_fences(&self, hang: bool) {
        self.lock().hang_fences = hang;
    }

    /// Queues image indices returned by the next acquires, ahead of round robin.
    pub fn queue_acquire_indices(&self, indices: impl IntoIterator<Item = u32>) {
        self.lock().acquire_sequence.extend(indices);
    }

    /// The next acquire returns `result`. `SUBOPTIMAL_KHR` still acquires an image.
    pub fn fail_next_acquire(&self, result: vk::Result) {
        self.lock().acquire_results.push_back(result);
    }

    /// The next present returns `result`. `SUBOPTIMAL_KHR` still presents.
    pub fn fail_next_present(&self, result: vk::Result) {
        self.lock().present_results.push_back(result);
    }

    /// The next `command` on any command buffer returns `result` and leaves
    /// the buffer's state unchanged.
    pub fn fail_next_command(&self, command: MockCommand, result: vk::Result) {
        self.lock().command_failures.insert(command, result);
    }

    /// The next queue submission returns `result` without consuming,
    /// signaling or executing anything.
    pub fn fail_next_submit(&self, result: vk::Result) {
        self.lock().submit_failures.push_back(result);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Number of live resources of `kind`.
    pub fn live(&self, kind: MockResource) -> usize {
        self.lock().live.get(&kind).copied().unwrap_or(0)
    }

    /// Number of live resources of every kind.
    pub fn live_total(&self) -> usize {
        let state = self.lock();
        ALL_RESOURCES
            .iter()
            .map(|kind| state.live.get(kind).copied().unwrap_or(0))
            .sum()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    /// Drops recorded events, barriers, renderings, submits and presents.
    pub fn clear_records(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.barrier_batches.clear();
        state.renderings.clear();
        state.submits.clear();
        state.presents.clear();
    }

    pub fn barrier_batches(&self) -> Vec<BarrierBatch> {
        self.lock().barrier_batches.clone()
    }

    pub fn renderings(&self) -> Vec<RenderingRecord> {
        self.lock().renderings.clone()
    }

    pub fn submits(&self) -> Vec<SubmitRecord> {
        self.lock().submits.clone()
    }

    pub fn presents(&self) -> Vec<PresentRecord> {
        self.lock().presents.clone()
    }

    pub fn swapchain_creations(&self) -> Vec<SwapchainCreation> {
        self.lock().swapchain_creations.clone()
    }

    /// Misuse detected so far, in the order it happened.
    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    /// Whether `fence` is currently signaled, without counting as a status poll.
    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.lock().fences.get(&fence).is_some_and(|f| f.signaled)
    }
}

fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

impl GpuDevice for MockDevice {
    fn queue_family_index(&self) -> u32 {
        0
    }

    fn limits(&self) -> vk::PhysicalDeviceLimits {
        self.limits
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let optimal = if is_depth_format(format) {
            if self.unsupported_depth_formats.contains(&format) {
                vk::FormatFeatureFlags::empty()
            } else {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            }
        } else if format == vk::Format::UNDEFINED {
            vk::FormatFeatureFlags::empty()
        } else {
            vk::FormatFeatureFlags::COLOR_ATTACHMENT
                | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND
                | vk::FormatFeatureFlags::SAMPLED_IMAGE
        };

        vk::FormatProperties {
            optimal_tiling_features: optimal,
            ..Default::default()
        }
    }

    fn supports_present_wait(&self) -> bool {
        self.present_wait
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::WaitIdle);
        if state.hang_fences {
            return Ok(());
        }
        let pending: Vec<vk::Fence> = state
            .fences
            .iter()
            .filter(|(_, f)| f.pending.is_some())
            .map(|(fence, _)| *fence)
            .collect();
        for fence in pending {
            state.complete_fence(fence);
        }
        Ok(())
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.lock();
        state.check_creation(MockResource::Semaphore)?;
        let semaphore = vk::Semaphore::from_raw(state.handle());
        state.semaphores.insert(semaphore, false);
        state.created(MockResource::Semaphore, 1);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.lock();
        if state.semaphores.remove(&semaphore).is_some() {
            state.destroyed(MockResource::Semaphore, 1);
        } else {
            state.violation(format!("destroying unknown semaphore {semaphore:?}"));
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.lock();
        state.check_creation(MockResource::Fence)?;
        let fence = vk::Fence::from_raw(state.handle());
        state.fences.insert(
            fence,
            FenceState {
                signaled,
                ..Default::default()
            },
        );
        state.created(MockResource::Fence, 1);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.lock();
        match state.fences.remove(&fence) {
            Some(f) => {
                if f.pending.is_some() {
                    state.violation(format!("destroying {fence:?} while its work is pending"));
                }
                state.destroyed(MockResource::Fence, 1);
            }
            None => state.violation(format!("destroying unknown fence {fence:?}")),
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::FenceWait(fence));
        let (signaled, pending) = match state.fences.get(&fence) {
            Some(f) => (f.signaled, f.pending.is_some()),
            None => {
                state.violation(format!("waiting on unknown fence {fence:?}"));
                return Err(vk::Result::ERROR_UNKNOWN);
            }
        };

        if signaled {
            Ok(())
        } else if pending && !state.hang_fences {
            state.complete_fence(fence);
            Ok(())
        } else {
            // Nothing will ever signal it
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::FenceReset(fence));
        match state.fences.get_mut(&fence) {
            Some(f) if f.pending.is_some() => {
                state.violation(format!("resetting {fence:?} while its work is pending"));
            }
            Some(f) => f.signaled = false,
            None => state.violation(format!("resetting unknown fence {fence:?}")),
        }
        Ok(())
    }

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        let mut state = self.lock();
        let hang = state.hang_fences;
        let complete = match state.fences.get_mut(&fence) {
            Some(f) => match f.pending {
                Some(polls) if !hang => {
                    let left = polls.saturating_sub(1);
                    f.pending = Some(left);
                    left == 0
                }
                _ => return Ok(f.signaled),
            },
            None => return Err(vk::Result::ERROR_UNKNOWN),
        };
        if complete {
            state.complete_fence(fence);
        }
        Ok(complete)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn create_command_pool(
        &self,
        _flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        let mut state = self.lock();
        state.check_creation(MockResource::CommandPool)?;
        let pool = vk::CommandPool::from_raw(state.handle());
        state.pools.insert(pool, Vec::new());
        state.created(MockResource::CommandPool, 1);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.lock();
        let Some(buffers) = state.pools.remove(&pool) else {
            state.violation(format!("destroying unknown command pool {pool:?}"));
            return;
        };
        for buffer in &buffers {
            if state.command_buffers.remove(buffer) == Some(CommandBufferState::Pending) {
                state.violation(format!("destroying pool while {buffer:?} is pending"));
            }
            state.rendering_active.remove(buffer);
        }
        state.destroyed(MockResource::CommandBuffer, buffers.len());
        state.destroyed(MockResource::CommandPool, 1);
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.lock();
        state.check_creation(MockResource::CommandBuffer)?;
        if !state.pools.contains_key(&pool) {
            state.violation(format!("allocating from unknown command pool {pool:?}"));
            return Err(vk::Result::ERROR_UNKNOWN);
        }

        let buffers: Vec<vk::CommandBuffer> = (0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.handle()))
            .collect();
        for buffer in &buffers {
            state
                .command_buffers
                .insert(*buffer, CommandBufferState::Initial);
        }
        if let Some(owned) = state.pools.get_mut(&pool) {
            owned.extend_from_slice(&buffers);
        }
        state.created(MockResource::CommandBuffer, buffers.len());
        Ok(buffers)
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.lock();
        let mut freed = 0;
        for buffer in buffers {
            let owned = state
                .pools
                .get_mut(&pool)
                .and_then(|owned| owned.iter().position(|b| b == buffer).map(|i| owned.swap_remove(i)));
            if owned.is_none() {
                state.violation(format!("freeing {buffer:?} not owned by {pool:?}"));
                continue;
            }
            if state.command_buffers.remove(buffer) == Some(CommandBufferState::Pending) {
                state.violation(format!("freeing {buffer:?} while pending"));
            }
            state.rendering_active.remove(buffer);
            freed += 1;
        }
        state.destroyed(MockResource::CommandBuffer, freed);
    }

    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::CommandBufferReset(buffer));
        if let Some(failure) = state.command_failures.remove(&MockCommand::Reset) {
            return Err(failure);
        }
        match state.command_buffers.get(&buffer).copied() {
            Some(CommandBufferState::Pending) => {
                state.violation(format!("resetting {buffer:?} while pending"));
            }
            Some(_) => {
                state
                    .command_buffers
                    .insert(buffer, CommandBufferState::Initial);
                state.rendering_active.remove(&buffer);
            }
            None => state.violation(format!("resetting unknown command buffer {buffer:?}")),
        }
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::CommandBufferBegin(buffer));
        if let Some(failure) = state.command_failures.remove(&MockCommand::Begin) {
            return Err(failure);
        }
        match state.command_buffers.get(&buffer).copied() {
            Some(CommandBufferState::Pending) | Some(CommandBufferState::Recording) => {
                let current = state.command_buffers[&buffer];
                state.violation(format!("beginning {buffer:?} in state {current:?}"));
            }
            Some(_) => {
                state
                    .command_buffers
                    .insert(buffer, CommandBufferState::Recording);
            }
            None => state.violation(format!("beginning unknown command buffer {buffer:?}")),
        }
        Ok(())
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::CommandBufferEnd(buffer));
        if let Some(failure) = state.command_failures.remove(&MockCommand::End) {
            return Err(failure);
        }
        state.expect_recording(buffer, "end");
        if state.rendering_active.remove(&buffer) {
            state.violation(format!("ending {buffer:?} inside a rendering scope"));
        }
        if state.command_buffers.get(&buffer) == Some(&CommandBufferState::Recording) {
            state
                .command_buffers
                .insert(buffer, CommandBufferState::Executable);
        }
        Ok(())
    }

    fn cmd_pipeline_barrier2(
        &self,
        buffer: vk::CommandBuffer,
        image_barriers: &[vk::ImageMemoryBarrier2<'static>],
    ) {
        let mut state = self.lock();
        state.events.push(MockEvent::PipelineBarrier(buffer));
        state.expect_recording(buffer, "pipeline barrier");
        state.barrier_batches.push(BarrierBatch {
            command_buffer: buffer,
            barriers: image_barriers.to_vec(),
        });
    }

    fn cmd_begin_rendering(&self, buffer: vk::CommandBuffer, rendering: &RenderingInfoBundle) {
        let mut state = self.lock();
        state.events.push(MockEvent::BeginRendering(buffer));
        state.expect_recording(buffer, "begin rendering");
        if !state.rendering_active.insert(buffer) {
            state.violation(format!("nested rendering scope on {buffer:?}"));
        }
        state.renderings.push(RenderingRecord {
            command_buffer: buffer,
            render_area: rendering.render_area(),
            layer_count: rendering.layer_count(),
            color_attachments: rendering.color_attachments().to_vec(),
            depth_attachment: rendering.depth_attachment().copied(),
            stencil_attachment: rendering.stencil_attachment().copied(),
        });
    }

    fn cmd_end_rendering(&self, buffer: vk::CommandBuffer) {
        let mut state = self.lock();
        state.events.push(MockEvent::EndRendering(buffer));
        state.expect_recording(buffer, "end rendering");
        if !state.rendering_active.remove(&buffer) {
            state.violation(format!("end rendering on {buffer:?} without a scope"));
        }
    }

    fn queue_submit2(&self, submit: &QueueSubmit<'_>) -> VkResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::Submit(submit.fence));
        if let Some(failure) = state.submit_failures.pop_front() {
            return Err(failure);
        }

        for info in submit.wait {
            state.consume_semaphore(info.semaphore, "submit");
        }
        for buffer in submit.command_buffers {
            match state.command_buffers.get(buffer).copied() {
                Some(CommandBufferState::Executable) => {
                    state
                        .command_buffers
                        .insert(*buffer, CommandBufferState::Pending);
                }
                Some(other) => {
                    state.violation(format!("submitting {buffer:?} in state {other:?}"));
                }
                None => state.violation(format!("submitting unknown command buffer {buffer:?}")),
            }
        }
        for info in submit.signal {
            state.signal_semaphore(info.semaphore, "submit");
        }

        state.submits.push(SubmitRecord {
            command_buffers: submit.command_buffers.to_vec(),
            wait: submit
                .wait
                .iter()
                .map(|w| (w.semaphore, w.stage_mask))
                .collect(),
            signal: submit
                .signal
                .iter()
                .map(|s| (s.semaphore, s.stage_mask))
                .collect(),
            fence: submit.fence,
        });

        if submit.fence != vk::Fence::null() {
            let delay = state.fence_delay;
            let hang = state.hang_fences;
            let fence = submit.fence;
            match state.fences.get_mut(&fence) {
                Some(f) if f.signaled || f.pending.is_some() => {
                    state.violation(format!("submitting with {fence:?} which is not reset"));
                }
                Some(f) => {
                    f.pending = Some(delay.max(1));
                    f.command_buffers = submit.command_buffers.to_vec();
                    if delay == 0 && !hang {
                        state.complete_fence(fence);
                    }
                }
                None => state.violation(format!("submitting with unknown fence {fence:?}")),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Images
    // ========================================================================

    fn create_image(&self, _info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let mut state = self.lock();
        state.check_creation(MockResource::Image)?;
        let image = vk::Image::from_raw(state.handle());
        state.images.insert(image);
        state.created(MockResource::Image, 1);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.lock();
        if state.images.remove(&image) {
            state.destroyed(MockResource::Image, 1);
        } else {
            state.violation(format!("destroying unknown image {image:?}"));
        }
    }

    fn bind_image_memory(&self, image: vk::Image, name: &str) -> RhiResult<ImageMemory> {
        let mut state = self.lock();
        state
            .check_creation(MockResource::ImageMemory)
            .map_err(|e| RhiError::creation(format!("{name} memory"), e))?;
        if !state.images.contains(&image) {
            state.violation(format!("binding memory to unknown image {image:?}"));
        }
        state.created(MockResource::ImageMemory, 1);
        Ok(ImageMemory::unbacked(4096))
    }

    fn free_image_memory(&self, _memory: ImageMemory) {
        self.lock().destroyed(MockResource::ImageMemory, 1);
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        let mut state = self.lock();
        state.check_creation(MockResource::ImageView)?;
        let view = vk::ImageView::from_raw(state.handle());
        state.views.insert(view);
        state.created(MockResource::ImageView, 1);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.lock();
        if state.views.remove(&view) {
            state.destroyed(MockResource::ImageView, 1);
        } else {
            state.violation(format!("destroying unknown image view {view:?}"));
        }
    }

    // ========================================================================
    // Swapchain
    // ========================================================================

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.lock();
        state.check_creation(MockResource::Swapchain)?;

        if info.old_swapchain != vk::SwapchainKHR::null()
            && !state.swapchains.contains_key(&info.old_swapchain)
        {
            state.violation(format!(
                "old swapchain {:?} is not live",
                info.old_swapchain
            ));
        }

        let swapchain = vk::SwapchainKHR::from_raw(state.handle());
        let count = self.image_count_override.unwrap_or(info.min_image_count);
        let images = (0..count)
            .map(|_| vk::Image::from_raw(state.handle()))
            .collect();
        state.swapchains.insert(
            swapchain,
            SwapchainState {
                images,
                acquired: HashSet::new(),
                next: 0,
            },
        );
        state.swapchain_creations.push(SwapchainCreation {
            swapchain,
            min_image_count: info.min_image_count,
            extent: info.image_extent,
            format: info.image_format,
            color_space: info.image_color_space,
            present_mode: info.present_mode,
            old_swapchain: info.old_swapchain,
            image_usage: info.image_usage,
            pre_transform: info.pre_transform,
            composite_alpha: info.composite_alpha,
            clipped: info.clipped == vk::TRUE,
        });
        state.created(MockResource::Swapchain, 1);
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.lock();
        if state.swapchains.remove(&swapchain).is_some() {
            state.destroyed(MockResource::Swapchain, 1);
        } else {
            state.violation(format!("destroying unknown swapchain {swapchain:?}"));
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.lock()
            .swapchains
            .get(&swapchain)
            .map(|s| s.images.clone())
            .ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.lock();
        let suboptimal = match state.acquire_results.pop_front() {
            Some(vk::Result::SUBOPTIMAL_KHR) => true,
            Some(failure) => return Err(failure),
            None => false,
        };

        let queued = state.acquire_sequence.pop_front();
        let Some(chain) = state.swapchains.get_mut(&swapchain) else {
            state.violation(format!("acquiring from unknown swapchain {swapchain:?}"));
            return Err(vk::Result::ERROR_UNKNOWN);
        };
        let count = chain.images.len() as u32;
        let index = match queued {
            Some(index) => index,
            None => {
                let index = chain.next % count.max(1);
                chain.next = chain.next.wrapping_add(1);
                index
            }
        };
        let double_acquire = !chain.acquired.insert(index);

        if double_acquire {
            state.violation(format!("image {index} acquired twice without a present"));
        }
        state.signal_semaphore(semaphore, "acquire");
        state.events.push(MockEvent::Acquire {
            semaphore,
            image_index: index,
        });
        Ok((index, suboptimal))
    }

    fn queue_present(&self, request: &PresentRequest) -> VkResult<bool> {
        let mut state = self.lock();
        state.events.push(MockEvent::Present(request.image_index));
        state.consume_semaphore(request.wait_semaphore, "present");

        let released = state
            .swapchains
            .get_mut(&request.swapchain)
            .map(|chain| chain.acquired.remove(&request.image_index));
        match released {
            Some(true) => {}
            Some(false) => state.violation(format!(
                "presenting image {} which was not acquired",
                request.image_index
            )),
            None => state.violation(format!(
                "presenting to unknown swapchain {:?}",
                request.swapchain
            )),
        }

        state.presents.push(PresentRecord {
            swapchain: request.swapchain,
            image_index: request.image_index,
            wait_semaphore: request.wait_semaphore,
            present_id: request.present_id,
        });

        match state.present_results.pop_front() {
            Some(vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Some(failure) => Err(failure),
            None => {
                if let Some(id) = request.present_id {
                    state.max_presented_id = state.max_presented_id.max(id);
                }
                Ok(false)
            }
        }
    }

    fn wait_for_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        present_id: u64,
        _timeout: u64,
    ) -> VkResult<()> {
        if !self.present_wait {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        if present_id <= self.lock().max_presented_id {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }
}

#[derive(Debug)]
struct SurfaceState {
    capabilities: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    lost: bool,
}

/// A [`PresentSurface`] with adjustable capabilities.
///
/// Setters take `&self` so a test can resize the surface while the engine
/// holds a reference to it.
#[derive(Debug)]
pub struct MockSurface {
    state: Mutex<SurfaceState>,
}

impl MockSurface {
    /// A `width` x `height` surface allowing 2 to 8 images, offering
    /// `B8G8R8A8_UNORM` and `B8G8R8A8_SRGB` in sRGB non-linear, FIFO and MAILBOX.
    pub fn new(width: u32, height: u32) -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D { width, height },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 16384,
                height: 16384,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
        };
        let formats = [vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB]
            .into_iter()
            .map(|format| vk::SurfaceFormatKHR {
                format,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            })
            .collect();

        Self {
            state: Mutex::new(SurfaceState {
                capabilities,
                formats,
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                lost: false,
            }),
        }
    }

    pub fn with_image_count_range(self, min: u32, max: u32) -> Self {
        {
            let mut state = self.lock();
            state.capabilities.min_image_count = min;
            state.capabilities.max_image_count = max;
        }
        self
    }

    pub fn with_present_modes(self, modes: &[vk::PresentModeKHR]) -> Self {
        self.lock().present_modes = modes.to_vec();
        self
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the current extent, as a window resize would.
    pub fn set_extent(&self, width: u32, height: u32) {
        self.lock().capabilities.current_extent = vk::Extent2D { width, height };
    }

    /// Makes every query fail with `ERROR_SURFACE_LOST_KHR`.
    pub fn set_lost(&self, lost: bool) {
        self.lock().lost = lost;
    }
}

impl PresentSurface for MockSurface {
    fn handle(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5eed)
    }

    fn capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let state = self.lock();
        if state.lost {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        Ok(state.capabilities)
    }

    fn formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        let state = self.lock();
        if state.lost {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        Ok(state.formats.clone())
    }

    fn present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        let state = self.lock();
        if state.lost {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        Ok(state.present_modes.clone())
    }
}
