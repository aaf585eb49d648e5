//! The device and surface seam.
//!
//! Everything above the raw Vulkan calls talks to the GPU through
//! [`GpuDevice`] and to the window system through [`PresentSurface`].
//! [`crate::device::Device`] and [`crate::surface::SurfaceBinding`] are the
//! real implementations; the `mock` feature adds recording doubles so frame
//! pacing can be exercised without a GPU.
//!
//! Methods mirror the `ash` device functions they wrap and return the raw
//! [`VkResult`]. The RAII wrappers in [`crate::sync`], [`crate::command`],
//! [`crate::image`] and [`crate::swapchain`] turn those results into
//! [`crate::RhiError`] values with context.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;

use crate::error::RhiResult;
use crate::image::ImageMemory;
use crate::rendering::RenderingInfoBundle;

/// Shared handle to the device every wrapper keeps alive.
pub type SharedDevice = Arc<dyn GpuDevice>;

/// One queue submission: wait on `wait`, run `command_buffers`, signal
/// `signal`, then signal `fence` once the GPU is done.
#[derive(Debug, Clone, Copy)]
pub struct QueueSubmit<'a> {
    pub wait: &'a [vk::SemaphoreSubmitInfo<'static>],
    pub command_buffers: &'a [vk::CommandBuffer],
    pub signal: &'a [vk::SemaphoreSubmitInfo<'static>],
    pub fence: vk::Fence,
}

/// One swapchain image handed back to the presentation engine.
#[derive(Debug, Clone, Copy)]
pub struct PresentRequest {
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait_semaphore: vk::Semaphore,
    /// Attached through `VK_KHR_present_id` when the device supports it.
    pub present_id: Option<u64>,
}

/// Logical device operations used by the presentation engine.
///
/// Implementations must be safe to share between threads; the engine itself
/// only calls them from the thread that owns the scheduler.
pub trait GpuDevice: Send + Sync {
    // ========================================================================
    // Device
    // ========================================================================

    /// Queue family of the single graphics + present queue.
    fn queue_family_index(&self) -> u32;

    fn limits(&self) -> vk::PhysicalDeviceLimits;

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    /// Whether `VK_KHR_present_id` and `VK_KHR_present_wait` are enabled.
    fn supports_present_wait(&self) -> bool;

    fn wait_idle(&self) -> VkResult<()>;

    // ========================================================================
    // Synchronization
    // ========================================================================

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;

    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;

    fn destroy_fence(&self, fence: vk::Fence);

    /// Blocks until `fence` is signaled. Returns `vk::Result::TIMEOUT` when
    /// `timeout` nanoseconds pass first.
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool>;

    // ========================================================================
    // Commands
    // ========================================================================

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags)
    -> VkResult<vk::CommandPool>;

    /// Destroys the pool and every command buffer allocated from it.
    fn destroy_command_pool(&self, pool: vk::CommandPool);

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()>;

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()>;

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()>;

    fn cmd_pipeline_barrier2(
        &self,
        buffer: vk::CommandBuffer,
        image_barriers: &[vk::ImageMemoryBarrier2<'static>],
    );

    fn cmd_begin_rendering(&self, buffer: vk::CommandBuffer, rendering: &RenderingInfoBundle);

    fn cmd_end_rendering(&self, buffer: vk::CommandBuffer);

    fn queue_submit2(&self, submit: &QueueSubmit<'_>) -> VkResult<()>;

    // ========================================================================
    // Images
    // ========================================================================

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image>;

    fn destroy_image(&self, image: vk::Image);

    /// Allocates device-local memory for `image` and binds it.
    fn bind_image_memory(&self, image: vk::Image, name: &str) -> RhiResult<ImageMemory>;

    fn free_image_memory(&self, memory: ImageMemory);

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView>;

    fn destroy_image_view(&self, view: vk::ImageView);

    // ========================================================================
    // Swapchain
    // ========================================================================

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR>;

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    /// Returns the acquired index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// Returns whether the swapchain is suboptimal.
    fn queue_present(&self, request: &PresentRequest) -> VkResult<bool>;

    fn wait_for_present(
        &self,
        swapchain: vk::SwapchainKHR,
        present_id: u64,
        timeout: u64,
    ) -> VkResult<()>;
}

/// A window-system surface bound to the physical device that will present to it.
pub trait PresentSurface {
    fn handle(&self) -> vk::SurfaceKHR;

    fn capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    fn formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    fn present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;
}
