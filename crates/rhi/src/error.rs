//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// Why a swapchain has to be rebuilt before presenting again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The surface changed and the swapchain no longer matches it.
    OutOfDate,
    /// Presentation still works but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// The surface itself is gone.
    SurfaceLost,
}

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// A factory call failed; anything created before it was released.
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// A fence or present wait ran past its timeout.
    #[error("Synchronization timeout: {0}")]
    SynchronizationTimeout(String),

    /// Acquire or present reported that the swapchain must be rebuilt.
    #[error("Swapchain is stale ({0:?}), rebuild required")]
    SwapchainStale(StaleReason),

    /// The requested format, sample count or extension is not supported.
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// An operation was called out of order.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RhiError {
    /// Wraps a failed creation call with the name of what was being created.
    pub fn creation(what: impl std::fmt::Display, result: vk::Result) -> Self {
        Self::ResourceCreation(format!("{what}: {result}"))
    }

    /// Returns true if the caller should rebuild the swapchain and retry.
    #[inline]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::SwapchainStale(_))
    }

    /// Returns true if a wait timed out.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SynchronizationTimeout(_))
    }

    /// Classifies an acquire or present failure.
    ///
    /// Out-of-date, suboptimal and surface-lost become [`RhiError::SwapchainStale`];
    /// timeouts and not-ready become [`RhiError::SynchronizationTimeout`].
    pub fn from_present_result(result: vk::Result, operation: &str) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainStale(StaleReason::OutOfDate),
            vk::Result::SUBOPTIMAL_KHR => Self::SwapchainStale(StaleReason::Suboptimal),
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SwapchainStale(StaleReason::SurfaceLost),
            vk::Result::TIMEOUT | vk::Result::NOT_READY => {
                Self::SynchronizationTimeout(format!("{operation} returned {result}"))
            }
            other => Self::VulkanError(other),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
