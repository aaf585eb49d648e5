//! Synchronization primitives for Vulkan.
//!
//! This module provides RAII wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//!
//! # Overview
//!
//! Presenting a frame chains two semaphores and one fence:
//!
//! - A **frame slot semaphore** is signaled by image acquisition and waited
//!   on by the frame's submission.
//! - A **swapchain image semaphore** is signaled by the submission and waited
//!   on by presentation. It belongs to the image, not the frame slot, so a
//!   semaphore is never re-signaled while presentation still holds it.
//! - A **frame slot fence** is signaled when the submission retires and is
//!   waited on before the slot's command buffer is recorded again.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::SharedDevice;
//! use vkframe_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: SharedDevice) -> Result<(), vkframe_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//!
//! // Created signaled so the first wait returns immediately
//! let in_flight = Fence::new(device.clone(), true)?;
//!
//! in_flight.wait(1_000_000_000)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::gpu::SharedDevice;

/// Vulkan semaphore wrapper.
///
/// The semaphore is created unsignaled and destroyed on drop.
///
/// # Thread Safety
///
/// The semaphore is immutable after creation and can be safely shared between
/// threads.
pub struct Semaphore {
    /// Reference to the logical device.
    device: SharedDevice,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if the driver refuses.
    pub fn new(device: SharedDevice) -> RhiResult<Self> {
        let semaphore = device
            .create_semaphore()
            .map_err(|e| RhiError::creation("semaphore", e))?;

        debug!("Created semaphore {:?}", semaphore);

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
        debug!("Destroyed semaphore {:?}", self.semaphore);
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Semaphore").field(&self.semaphore).finish()
    }
}

/// Vulkan fence wrapper.
///
/// Fences are used for GPU-to-CPU synchronization, allowing the host to wait
/// for GPU operations to complete before reusing the resources they touched.
///
/// # Thread Safety
///
/// Wait and reset can be called from any thread, but proper synchronization
/// is the caller's responsibility when accessing fence state.
pub struct Fence {
    /// Reference to the logical device.
    device: SharedDevice,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state.
    ///   Frame slots use this so the first wait on a fresh slot returns
    ///   immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if fence creation fails.
    pub fn new(device: SharedDevice, signaled: bool) -> RhiResult<Self> {
        let fence = device
            .create_fence(signaled)
            .map_err(|e| RhiError::creation("fence", e))?;

        debug!(
            "Created fence {:?} ({})",
            fence,
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds. `u64::MAX` waits forever.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SynchronizationTimeout`] if `timeout` elapses first
    /// - [`RhiError::VulkanError`] if the wait fails for another reason
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        match self.device.wait_for_fence(self.fence, timeout) {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::SynchronizationTimeout(format!(
                "fence {:?} not signaled after {} ns",
                self.fence, timeout
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any pending submission.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_fence(self.fence)?;
        Ok(())
    }

    /// Checks if the fence is currently signaled without blocking.
    pub fn is_signaled(&self) -> bool {
        matches!(self.device.fence_status(self.fence), Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
        debug!("Destroyed fence {:?}", self.fence);
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Fence").field(&self.fence).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mock::{MockDevice, MockResource};

    #[test]
    fn test_semaphore_destroyed_on_drop() {
        let mock = Arc::new(MockDevice::new());
        let semaphore = Semaphore::new(mock.clone()).unwrap();
        assert_ne!(semaphore.handle(), vk::Semaphore::null());
        assert_eq!(mock.live(MockResource::Semaphore), 1);

        drop(semaphore);
        assert_eq!(mock.live(MockResource::Semaphore), 0);
    }

    #[test]
    fn test_signaled_fence_wait_returns_immediately() {
        let mock = Arc::new(MockDevice::new());
        let fence = Fence::new(mock.clone(), true).unwrap();
        assert!(fence.is_signaled());
        fence.wait(0).unwrap();
        fence.reset().unwrap();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_wait_timeout_is_classified() {
        let mock = Arc::new(MockDevice::new());
        let fence = Fence::new(mock.clone(), false).unwrap();

        let err = fence.wait(1_000).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_creation_failure_names_resource() {
        let mock = Arc::new(MockDevice::new());
        mock.fail_creation(MockResource::Fence, 0);

        let err = Fence::new(mock.clone(), true).unwrap_err();
        assert!(matches!(err, RhiError::ResourceCreation(ref msg) if msg.contains("fence")));
        assert_eq!(mock.live(MockResource::Fence), 0);
    }

    #[test]
    fn test_sync_primitives_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
