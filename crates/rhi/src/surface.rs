//! Surface capability resolution.
//!
//! This module answers "what swapchain can this surface take?":
//! - [`SurfaceBinding`] pairs a VkSurfaceKHR with the physical device that
//!   presents to it and implements [`PresentSurface`]
//! - [`SurfaceSupport`] snapshots capabilities, formats and present modes
//! - [`SurfaceFormatFilter`] and [`PresentModeFilter`] match the requested
//!   format and mode exactly; there is no silent fallback
//! - [`SurfaceSupport::resolve`] turns a request into a [`ResolvedSurface`]
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::surface::SurfaceSupport;
//! use vkframe_rhi::PresentSurface;
//!
//! # fn example(surface: &dyn PresentSurface) -> Result<(), vkframe_rhi::RhiError> {
//! let support = SurfaceSupport::query(surface)?;
//! let resolved = support.resolve(
//!     vk::SurfaceFormatKHR {
//!         format: vk::Format::B8G8R8A8_UNORM,
//!         color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
//!     },
//!     vk::PresentModeKHR::FIFO,
//!     3,
//!     vk::Extent2D { width: 1280, height: 720 },
//! )?;
//! println!("{} images at {:?}", resolved.image_count, resolved.extent);
//! # Ok(())
//! # }
//! ```

use ash::prelude::VkResult;
use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult, StaleReason};
use crate::gpu::PresentSurface;
use crate::instance::Instance;

/// A surface bound to the physical device that presents to it.
///
/// Does not own the surface handle; the window layer destroys it after every
/// swapchain built on it is gone.
pub struct SurfaceBinding {
    loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
}

impl SurfaceBinding {
    pub fn new(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        Self {
            loader,
            surface,
            physical_device,
        }
    }

    /// Returns true if `queue_family_index` can present to this surface.
    pub fn supports_queue_family(&self, queue_family_index: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(
                    self.physical_device,
                    queue_family_index,
                    self.surface,
                )
                .unwrap_or(false)
        }
    }
}

impl PresentSurface for SurfaceBinding {
    fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
    }

    fn formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(self.physical_device, self.surface)
        }
    }

    fn present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
        }
    }
}

/// Surface support details.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries support details for a surface.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainStale`] if the surface is lost, or
    /// [`RhiError::SurfaceError`] if any other query fails.
    pub fn query(surface: &dyn PresentSurface) -> RhiResult<Self> {
        let map = |what: &str, e: vk::Result| match e {
            vk::Result::ERROR_SURFACE_LOST_KHR => RhiError::SwapchainStale(StaleReason::SurfaceLost),
            other => RhiError::SurfaceError(format!("{what} query failed: {other}")),
        };

        let capabilities = surface.capabilities().map_err(|e| map("capabilities", e))?;
        let formats = surface.formats().map_err(|e| map("format", e))?;
        let present_modes = surface
            .present_modes()
            .map_err(|e| map("present mode", e))?;

        debug!(
            "Surface support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// The offered surface format matching `desired` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedConfiguration`] if the format and color
    /// space pair is not offered.
    pub fn select_surface_format(
        &self,
        desired: vk::SurfaceFormatKHR,
    ) -> RhiResult<vk::SurfaceFormatKHR> {
        SurfaceFormatFilter::new(desired)
            .apply(&self.formats)
            .first()
            .copied()
            .ok_or_else(|| {
                RhiError::UnsupportedConfiguration(format!(
                    "surface format {:?} / {:?} not supported",
                    desired.format, desired.color_space
                ))
            })
    }

    /// The offered present mode matching `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedConfiguration`] if the mode is not offered.
    pub fn select_present_mode(
        &self,
        desired: vk::PresentModeKHR,
    ) -> RhiResult<vk::PresentModeKHR> {
        PresentModeFilter::new(desired)
            .apply(&self.present_modes)
            .first()
            .copied()
            .ok_or_else(|| {
                RhiError::UnsupportedConfiguration(format!("present mode {desired:?} not supported"))
            })
    }

    /// Resolves a swapchain request against this snapshot.
    ///
    /// # Errors
    ///
    /// - [`RhiError::UnsupportedConfiguration`] if the exact format/color
    ///   space or present mode is not offered
    /// - [`RhiError::SwapchainStale`] with [`StaleReason::OutOfDate`] if the
    ///   surface currently has zero area
    pub fn resolve(
        &self,
        desired_format: vk::SurfaceFormatKHR,
        desired_present_mode: vk::PresentModeKHR,
        target_min_image_count: u32,
        fallback_extent: vk::Extent2D,
    ) -> RhiResult<ResolvedSurface> {
        let surface_format = self.select_surface_format(desired_format)?;
        let present_mode = self.select_present_mode(desired_present_mode)?;

        let extent = choose_extent(&self.capabilities, fallback_extent);
        if extent.width == 0 || extent.height == 0 {
            debug!("Surface has zero extent, swapchain creation deferred");
            return Err(RhiError::SwapchainStale(StaleReason::OutOfDate));
        }

        Ok(ResolvedSurface {
            surface_format,
            present_mode,
            extent,
            image_count: clamp_image_count(&self.capabilities, target_min_image_count),
            pre_transform: self.capabilities.current_transform,
        })
    }
}

/// The swapchain parameters a surface accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSurface {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    /// Minimum image count to request; the driver may return more.
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Keeps only formats matching both format and color space.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceFormatFilter {
    desired: vk::SurfaceFormatKHR,
}

impl SurfaceFormatFilter {
    pub fn new(desired: vk::SurfaceFormatKHR) -> Self {
        Self { desired }
    }

    pub fn apply(&self, formats: &[vk::SurfaceFormatKHR]) -> Vec<vk::SurfaceFormatKHR> {
        formats
            .iter()
            .filter(|f| f.format == self.desired.format && f.color_space == self.desired.color_space)
            .copied()
            .collect()
    }
}

/// Keeps only the requested present mode.
#[derive(Debug, Clone, Copy)]
pub struct PresentModeFilter {
    desired: vk::PresentModeKHR,
}

impl PresentModeFilter {
    pub fn new(desired: vk::PresentModeKHR) -> Self {
        Self { desired }
    }

    pub fn apply(&self, modes: &[vk::PresentModeKHR]) -> Vec<vk::PresentModeKHR> {
        modes
            .iter()
            .filter(|&&mode| mode == self.desired)
            .copied()
            .collect()
    }
}

/// Chooses the swapchain extent.
///
/// Uses the surface's current extent when defined. When the surface leaves
/// it to the swapchain (width is `u32::MAX`), clamps `fallback` to the
/// surface's min/max extents.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    fallback: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: fallback.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: fallback.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, fallback.width, fallback.height
    );

    extent
}

/// Clamps a requested image count into the surface's range.
///
/// A `max_image_count` of zero means there is no upper bound.
pub fn clamp_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, target: u32) -> u32 {
    let mut count = target.max(capabilities.min_image_count);
    if capabilities.max_image_count != 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}
