//! Frame slots and the frame slot pool.
//!
//! This module provides the [`FrameSlotPool`], a fixed ring of CPU-side
//! pipelining slots. Each [`FrameSlot`] owns:
//!
//! - A command buffer allocated from a resettable pool
//! - A fence, created signaled, that the GPU signals when the slot's last
//!   submission completes
//! - A semaphore the presentation engine signals when the acquired image is
//!   ready to be rendered to
//!
//! # Overview
//!
//! The pool implements the "frames in flight" pattern: while the GPU renders
//! the frame recorded in slot N, the CPU records the next frame into slot
//! N+1. A slot's fence is the only thing that says whether the slot may be
//! reused.
//!
//! # Reuse Protocol
//!
//! ```text
//! 1. Wait on the slot's fence (bounded by a timeout)
//! 2. Acquire a swapchain image, signaling the slot's wait semaphore
//! 3. Reset the fence
//! 4. Reset and begin the command buffer
//! 5. Record, then submit with the fence
//! ```
//!
//! The fence is reset only once an image has been acquired, so a stale
//! swapchain never leaves a slot with an unsignaled fence and no submission.
//!
//! # Frame Index vs Image Index
//!
//! The pool's cursor ([`FrameSlotPool::frame_index`]) advances round robin,
//! one step per completed frame. It is unrelated to the swapchain image
//! index, which the driver chooses and may repeat in any order.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_presentation::frame_slot::FrameSlotPool;
//! use vkframe_rhi::SharedDevice;
//!
//! # fn example(device: SharedDevice) -> Result<(), vkframe_rhi::RhiError> {
//! let mut pool = FrameSlotPool::new(device, 3)?;
//!
//! let slot = pool.current();
//! slot.wait(u64::MAX)?;
//! // ... acquire using slot.wait_semaphore() ...
//! slot.begin_recording()?;
//! // ... record and submit with slot.fence() ...
//! pool.advance();
//! # Ok(())
//! # }
//! ```

use tracing::{debug, info};

use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::sync::{Fence, Semaphore};
use vkframe_rhi::{RhiError, RhiResult, SharedDevice};

/// Per-frame pipelining resources.
///
/// # Synchronization Flow
///
/// ```text
/// acquire         signals  wait_semaphore
/// queue submit    waits on wait_semaphore (COLOR_ATTACHMENT_OUTPUT)
///                 signals  the acquired image's own semaphore
///                 signals  fence
/// begin_frame     waits on fence before touching command_buffer
/// ```
pub struct FrameSlot {
    /// Command buffer re-recorded every time the slot is used.
    command_buffer: CommandBuffer,
    /// Signaled when the slot's last submission has completed.
    fence: Fence,
    /// Signaled by acquire, waited on by the submission.
    wait_semaphore: Semaphore,
    device: SharedDevice,
}

impl FrameSlot {
    fn new(device: SharedDevice, command_buffer: CommandBuffer) -> RhiResult<Self> {
        // Signaled so the first wait on a fresh slot returns immediately
        let fence = Fence::new(device.clone(), true)?;
        let wait_semaphore = Semaphore::new(device.clone())?;

        Ok(Self {
            command_buffer,
            fence,
            wait_semaphore,
            device,
        })
    }

    /// Returns a reference to the command buffer.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Returns a reference to the completion fence.
    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Returns a reference to the acquire wait semaphore.
    #[inline]
    pub fn wait_semaphore(&self) -> &Semaphore {
        &self.wait_semaphore
    }

    /// Blocks until the slot's previous submission has completed.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SynchronizationTimeout`] if `timeout` nanoseconds
    /// pass first. The slot is left untouched.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        self.fence.wait(timeout)
    }

    /// Resets the fence and the command buffer, then begins recording.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidState`] if the fence is not signaled, which
    /// means the previous submission might still be executing.
    pub fn begin_recording(&self) -> RhiResult<()> {
        if !self.fence.is_signaled() {
            return Err(RhiError::InvalidState(
                "frame slot reused before its fence signaled".to_string(),
            ));
        }
        self.fence.reset()?;
        self.command_buffer.reset()?;
        self.command_buffer.begin()?;
        Ok(())
    }

    /// Replaces the fence and semaphore after a frame was abandoned between
    /// acquire and submit.
    ///
    /// The old fence was reset but will never be signaled, and the old
    /// semaphore may hold a signal nothing will wait on.
    pub(crate) fn recover(&mut self) -> RhiResult<()> {
        self.fence = Fence::new(self.device.clone(), true)?;
        self.wait_semaphore = Semaphore::new(self.device.clone())?;
        debug!("Recovered frame slot sync objects");
        Ok(())
    }
}

impl std::fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot")
            .field("command_buffer", &self.command_buffer.handle())
            .field("fence", &self.fence.handle())
            .field("wait_semaphore", &self.wait_semaphore.handle())
            .finish()
    }
}

/// A fixed ring of frame slots with a round-robin cursor.
///
/// At most [`len`](Self::len) frames can be in flight; recording one more
/// blocks on the oldest slot's fence instead of overwriting its command
/// buffer.
///
/// # Thread Safety
///
/// The pool is not thread-safe. It should only be accessed from the thread
/// that drives the scheduler.
pub struct FrameSlotPool {
    /// Per-frame resources.
    slots: Vec<FrameSlot>,
    /// Current slot (0 to len - 1).
    frame_index: usize,
    /// Pool every slot's command buffer was allocated from. Dropped after
    /// the slots, which frees the command buffers.
    command_pool: CommandPool,
}

impl FrameSlotPool {
    /// Creates `count` frame slots.
    ///
    /// Creation is all-or-nothing: if any fence, semaphore or command buffer
    /// cannot be created, everything created so far is released.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidState`] if `count` is zero
    /// - [`RhiError::ResourceCreation`] if a resource cannot be created
    pub fn new(device: SharedDevice, count: u32) -> RhiResult<Self> {
        if count == 0 {
            return Err(RhiError::InvalidState(
                "frame slot pool needs at least one slot".to_string(),
            ));
        }

        let command_pool = CommandPool::new(device.clone())?;
        let buffers = command_pool.allocate_command_buffers(count)?;

        let mut slots = Vec::with_capacity(count as usize);
        for (i, buffer) in buffers.into_iter().enumerate() {
            slots.push(FrameSlot::new(device.clone(), buffer)?);
            debug!("Created frame slot {}", i);
        }

        info!("Frame slot pool created with {} slots", count);

        Ok(Self {
            slots,
            frame_index: 0,
            command_pool,
        })
    }

    /// Returns the slot the next frame records into.
    #[inline]
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.frame_index]
    }

    #[inline]
    pub(crate) fn current_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.frame_index]
    }

    /// Returns slot `index`, if it exists.
    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    /// Returns the current frame index (0 to len - 1).
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Advances the cursor to the next slot.
    pub fn advance(&mut self) {
        self.frame_index = (self.frame_index + 1) % self.slots.len();
    }

    /// Returns the number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a pool has at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Queue family the command buffers were allocated for.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.command_pool.queue_family_index()
    }
}

impl std::fmt::Debug for FrameSlotPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlotPool")
            .field("slots", &self.slots.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vkframe_rhi::QueueSubmit;
    use vkframe_rhi::mock::{MockDevice, MockResource};

    use super::*;

    fn submit(mock: &MockDevice, slot: &FrameSlot) {
        slot.command_buffer().end().unwrap();
        vkframe_rhi::GpuDevice::queue_submit2(
            mock,
            &QueueSubmit {
                wait: &[],
                command_buffers: &[slot.command_buffer().handle()],
                signal: &[],
                fence: slot.fence().handle(),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_pool_creates_one_set_per_slot() {
        let mock = Arc::new(MockDevice::new());
        let pool = FrameSlotPool::new(mock.clone(), 3).unwrap();

        assert_eq!(pool.len(), 3);
        assert_eq!(mock.live(MockResource::Fence), 3);
        assert_eq!(mock.live(MockResource::Semaphore), 3);
        assert_eq!(mock.live(MockResource::CommandBuffer), 3);

        // Fresh slots never block
        for i in 0..3 {
            assert!(pool.slot(i).unwrap().fence().is_signaled());
        }

        drop(pool);
        assert_eq!(mock.live_total(), 0);
    }

    #[test]
    fn test_zero_slots_rejected() {
        let mock = Arc::new(MockDevice::new());
        assert!(matches!(
            FrameSlotPool::new(mock.clone(), 0),
            Err(RhiError::InvalidState(_))
        ));
        assert_eq!(mock.live_total(), 0);
    }

    #[test]
    fn test_partial_creation_released() {
        let mock = Arc::new(MockDevice::new());
        mock.fail_creation(MockResource::Semaphore, 2);

        assert!(FrameSlotPool::new(mock.clone(), 3).is_err());
        assert_eq!(mock.live_total(), 0);
    }

    #[test]
    fn test_cursor_is_round_robin() {
        let mock = Arc::new(MockDevice::new());
        let mut pool = FrameSlotPool::new(mock.clone(), 3).unwrap();

        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(pool.frame_index());
            pool.advance();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_begin_recording_requires_signaled_fence() {
        let mock = Arc::new(MockDevice::new());
        mock.set_fence_delay(5);
        let pool = FrameSlotPool::new(mock.clone(), 2).unwrap();
        let slot = pool.current();

        slot.wait(0).unwrap();
        slot.begin_recording().unwrap();
        submit(&mock, slot);

        // Submitted work is still running
        assert!(matches!(
            slot.begin_recording(),
            Err(RhiError::InvalidState(_))
        ));

        slot.wait(u64::MAX).unwrap();
        slot.begin_recording().unwrap();
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn test_wait_times_out_on_hung_gpu() {
        let mock = Arc::new(MockDevice::new());
        mock.hang_fences(true);
        let pool = FrameSlotPool::new(mock.clone(), 2).unwrap();
        let slot = pool.current();

        slot.begin_recording().unwrap();
        submit(&mock, slot);

        let err = slot.wait(1_000_000).unwrap_err();
        assert!(err.is_timeout());

        mock.hang_fences(false);
        vkframe_rhi::GpuDevice::wait_idle(mock.as_ref()).unwrap();
    }

    #[test]
    fn test_recover_replaces_sync_objects() {
        let mock = Arc::new(MockDevice::new());
        let mut pool = FrameSlotPool::new(mock.clone(), 2).unwrap();
        let old_fence = pool.current().fence().handle();

        pool.current_mut().recover().unwrap();

        assert_ne!(pool.current().fence().handle(), old_fence);
        assert!(pool.current().fence().is_signaled());
        assert_eq!(mock.live(MockResource::Fence), 2);
        assert_eq!(mock.live(MockResource::Semaphore), 2);
    }
}
