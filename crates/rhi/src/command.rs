//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns a VkCommandPool whose buffers can be reset one by one
//! - [`CommandBuffer`] wraps a VkCommandBuffer with the recording calls the
//!   presentation engine needs: barriers and dynamic rendering scopes
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::SharedDevice;
//! use vkframe_rhi::command::CommandPool;
//!
//! # fn example(device: SharedDevice) -> Result<(), vkframe_rhi::RhiError> {
//! let pool = CommandPool::new(device)?;
//! let buffers = pool.allocate_command_buffers(3)?;
//!
//! let cmd = &buffers[0];
//! cmd.reset()?;
//! cmd.begin()?;
//! // ... record barriers and rendering ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::SharedDevice;
use crate::rendering::RenderingInfoBundle;

/// Vulkan command pool wrapper.
///
/// The pool is bound to the device's graphics + present queue family and is
/// created with `RESET_COMMAND_BUFFER`, so each frame slot can reset its own
/// buffer without touching the others.
///
/// # Thread Safety
///
/// Command pools are not thread-safe. Record from one thread per pool.
pub struct CommandPool {
    /// Reference to the logical device.
    device: SharedDevice,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a new resettable command pool for the device's queue family.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if command pool creation fails.
    pub fn new(device: SharedDevice) -> RhiResult<Self> {
        let queue_family_index = device.queue_family_index();
        let pool = device
            .create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .map_err(|e| RhiError::creation("command pool", e))?;

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers from this pool.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if allocation fails.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let buffers = self
            .device
            .allocate_command_buffers(self.pool, count)
            .map_err(|e| RhiError::creation(format!("{count} command buffers"), e))?;

        debug!("Allocated {} command buffers", buffers.len());

        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer::from_handle(self.device.clone(), buffer))
            .collect())
    }

    /// Returns command buffers to the pool.
    ///
    /// None of them may still be pending on the GPU.
    pub fn free_command_buffers(&self, buffers: &[CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        let handles: Vec<vk::CommandBuffer> = buffers.iter().map(CommandBuffer::handle).collect();
        self.device.free_command_buffers(self.pool, &handles);
        debug!("Freed {} command buffers", handles.len());
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

impl std::fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPool")
            .field("pool", &self.pool)
            .field("queue_family_index", &self.queue_family_index)
            .finish()
    }
}

/// Vulkan command buffer wrapper.
///
/// Commands are recorded between [`begin`](Self::begin) and
/// [`end`](Self::end). The wrapper does NOT own the underlying handle: it is
/// freed through [`CommandPool::free_command_buffers`] or when the pool is
/// destroyed.
pub struct CommandBuffer {
    /// Reference to the logical device.
    device: SharedDevice,
    /// Vulkan command buffer handle.
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Wraps an existing command buffer handle.
    #[inline]
    pub fn from_handle(device: SharedDevice, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Resets the buffer to the initial state.
    ///
    /// The fence guarding the buffer's last submission must have signaled.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_command_buffer(self.buffer)?;
        Ok(())
    }

    /// Begins recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        self.device
            .begin_command_buffer(self.buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        Ok(())
    }

    /// Ends recording.
    pub fn end(&self) -> RhiResult<()> {
        self.device.end_command_buffer(self.buffer)?;
        Ok(())
    }

    // =========================================================================
    // Synchronization Commands
    // =========================================================================

    /// Records a `vkCmdPipelineBarrier2` with image barriers only.
    ///
    /// An empty slice records nothing.
    pub fn pipeline_barrier2(&self, image_barriers: &[vk::ImageMemoryBarrier2<'static>]) {
        if image_barriers.is_empty() {
            return;
        }
        self.device.cmd_pipeline_barrier2(self.buffer, image_barriers);
    }

    // =========================================================================
    // Dynamic Rendering Commands
    // =========================================================================

    /// Begins a dynamic rendering scope.
    pub fn begin_rendering(&self, rendering: &RenderingInfoBundle) {
        self.device.cmd_begin_rendering(self.buffer, rendering);
    }

    /// Ends the current dynamic rendering scope.
    pub fn end_rendering(&self) {
        self.device.cmd_end_rendering(self.buffer);
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CommandBuffer").field(&self.buffer).finish()
    }
}
