//! Swapchain management.
//!
//! [`SwapchainManager`] owns a VkSwapchainKHR and one [`SwapchainImageSlot`]
//! per presentable image: the image (owned by the swapchain), a view and a
//! dedicated signal semaphore. The semaphore gates presentation of that
//! image; frame slots never share it.
//!
//! # Creation and recreation
//!
//! Creation is all-or-nothing. If the swapchain, any view or any semaphore
//! fails, everything created so far is released and no manager is returned.
//!
//! [`SwapchainManager::recreate`] passes the current swapchain as the
//! `old_swapchain` hint and destroys the old image slots only after the new
//! generation is live. On failure the old generation is left untouched.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::swapchain::{SwapchainManager, SwapchainRequest};
//! use vkframe_rhi::sync::Semaphore;
//! use vkframe_rhi::{PresentSurface, SharedDevice, vk};
//!
//! # fn example(device: SharedDevice, surface: &dyn PresentSurface) -> Result<(), vkframe_rhi::RhiError> {
//! let request = SwapchainRequest {
//!     surface_format: vk::SurfaceFormatKHR {
//!         format: vk::Format::B8G8R8A8_UNORM,
//!         color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
//!     },
//!     present_mode: vk::PresentModeKHR::FIFO,
//!     target_min_image_count: 3,
//!     fallback_extent: vk::Extent2D { width: 1280, height: 720 },
//! };
//! let swapchain = SwapchainManager::new(device.clone(), surface, &request)?;
//!
//! let acquire = Semaphore::new(device)?;
//! let image = swapchain.acquire_next_image(&acquire, u64::MAX)?;
//! // ... record and submit, signaling swapchain.slot(image.index).signal_semaphore() ...
//! swapchain.present(image.index, None)?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{PresentRequest, PresentSurface, SharedDevice};
use crate::image::ImageView;
use crate::surface::{ResolvedSurface, SurfaceSupport};
use crate::sync::Semaphore;

/// What the caller wants from the swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainRequest {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    /// Clamped into the surface's image count range.
    pub target_min_image_count: u32,
    /// Used only when the surface lets the swapchain pick its extent.
    pub fallback_extent: vk::Extent2D,
}

/// One presentable image with its view and signal semaphore.
#[derive(Debug)]
pub struct SwapchainImageSlot {
    image: vk::Image,
    view: ImageView,
    signal_semaphore: Semaphore,
}

impl SwapchainImageSlot {
    /// The presentable image. Owned by the swapchain.
    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// Signaled by the frame's submission, waited on by presentation.
    #[inline]
    pub fn signal_semaphore(&self) -> vk::Semaphore {
        self.signal_semaphore.handle()
    }
}

/// Result of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index chosen by the presentation engine.
    pub index: u32,
    /// The image is usable but the swapchain no longer matches the surface.
    pub suboptimal: bool,
}

/// One swapchain generation. Destroys the swapchain on drop, after its slots.
struct Generation {
    device: SharedDevice,
    swapchain: vk::SwapchainKHR,
    slots: Vec<SwapchainImageSlot>,
    resolved: ResolvedSurface,
}

impl Drop for Generation {
    fn drop(&mut self) {
        // Views and semaphores go before the swapchain that owns the images
        self.slots.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
            debug!("Destroyed swapchain {:?}", self.swapchain);
        }
    }
}

/// Owns the swapchain and its image slots.
pub struct SwapchainManager {
    device: SharedDevice,
    current: Generation,
}

impl SwapchainManager {
    /// Creates a swapchain for `surface`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::UnsupportedConfiguration`] if the format or present mode is unavailable
    /// - [`RhiError::SwapchainStale`] if the surface has zero area or is lost
    /// - [`RhiError::ResourceCreation`] if any handle cannot be created
    pub fn new(
        device: SharedDevice,
        surface: &dyn PresentSurface,
        request: &SwapchainRequest,
    ) -> RhiResult<Self> {
        let current = Self::create_generation(&device, surface, request, vk::SwapchainKHR::null())?;
        Ok(Self { device, current })
    }

    /// Builds a new generation for `surface`, retiring the current one.
    ///
    /// The caller must ensure no submitted work still references the current
    /// images, usually by waiting for the device to go idle.
    pub fn recreate(
        &mut self,
        surface: &dyn PresentSurface,
        request: &SwapchainRequest,
    ) -> RhiResult<()> {
        let next = Self::create_generation(&self.device, surface, request, self.current.swapchain)?;

        info!(
            "Swapchain recreated: {}x{} -> {}x{}, {} -> {} images",
            self.current.resolved.extent.width,
            self.current.resolved.extent.height,
            next.resolved.extent.width,
            next.resolved.extent.height,
            self.current.slots.len(),
            next.slots.len()
        );

        // Dropping the previous generation releases its slots, then the old swapchain
        drop(std::mem::replace(&mut self.current, next));
        Ok(())
    }

    fn create_generation(
        device: &SharedDevice,
        surface: &dyn PresentSurface,
        request: &SwapchainRequest,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Generation> {
        let support = SurfaceSupport::query(surface)?;
        let resolved = support.resolve(
            request.surface_format,
            request.present_mode,
            request.target_min_image_count,
            request.fallback_extent,
        )?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, min {} images",
            resolved.extent.width,
            resolved.extent.height,
            resolved.surface_format.format,
            resolved.surface_format.color_space,
            resolved.present_mode,
            resolved.image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(resolved.image_count)
            .image_format(resolved.surface_format.format)
            .image_color_space(resolved.surface_format.color_space)
            .image_extent(resolved.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(resolved.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(resolved.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = device
            .create_swapchain(&create_info)
            .map_err(|e| RhiError::creation("swapchain", e))?;

        // From here on the generation's Drop releases whatever exists on error
        let mut generation = Generation {
            device: device.clone(),
            swapchain,
            slots: Vec::new(),
            resolved,
        };

        let images = device
            .swapchain_images(swapchain)
            .map_err(|e| RhiError::creation("swapchain images", e))?;

        generation.slots.reserve(images.len());
        for (i, image) in images.into_iter().enumerate() {
            let view = ImageView::new(
                device.clone(),
                image,
                resolved.surface_format.format,
                vk::ImageAspectFlags::COLOR,
                &format!("swapchain image view {i}"),
            )?;
            let signal_semaphore = Semaphore::new(device.clone())?;
            generation.slots.push(SwapchainImageSlot {
                image,
                view,
                signal_semaphore,
            });
        }

        info!("Swapchain created with {} images", generation.slots.len());
        Ok(generation)
    }

    /// Acquires the next image, signaling `semaphore` when it is available.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SwapchainStale`] if the swapchain is out of date or the surface is lost
    /// - [`RhiError::SynchronizationTimeout`] if no image became available in time
    pub fn acquire_next_image(
        &self,
        semaphore: &Semaphore,
        timeout: u64,
    ) -> RhiResult<AcquiredImage> {
        let (index, suboptimal) = self
            .device
            .acquire_next_image(self.current.swapchain, timeout, semaphore.handle())
            .map_err(|e| RhiError::from_present_result(e, "acquire"))?;

        if index as usize >= self.current.slots.len() {
            return Err(RhiError::InvalidState(format!(
                "acquire returned image {index} but the swapchain has {} images",
                self.current.slots.len()
            )));
        }

        Ok(AcquiredImage { index, suboptimal })
    }

    /// Presents `image_index`, waiting on that image's signal semaphore.
    ///
    /// Returns true if the swapchain is suboptimal.
    pub fn present(&self, image_index: u32, present_id: Option<u64>) -> RhiResult<bool> {
        let slot = self.slot(image_index)?;
        let request = PresentRequest {
            swapchain: self.current.swapchain,
            image_index,
            wait_semaphore: slot.signal_semaphore(),
            present_id: present_id.filter(|_| self.device.supports_present_wait()),
        };

        self.device
            .queue_present(&request)
            .map_err(|e| RhiError::from_present_result(e, "present"))
    }

    /// Blocks until the present tagged `present_id` has been displayed.
    ///
    /// # Errors
    ///
    /// - [`RhiError::UnsupportedConfiguration`] without `VK_KHR_present_wait`
    /// - [`RhiError::SynchronizationTimeout`] if `timeout` elapses first
    pub fn wait_for_present(&self, present_id: u64, timeout: u64) -> RhiResult<()> {
        if !self.device.supports_present_wait() {
            return Err(RhiError::UnsupportedConfiguration(
                "VK_KHR_present_wait is not enabled".to_string(),
            ));
        }

        self.device
            .wait_for_present(self.current.swapchain, present_id, timeout)
            .map_err(|e| RhiError::from_present_result(e, "wait for present"))
    }

    /// Returns the image slot for `index`.
    pub fn slot(&self, index: u32) -> RhiResult<&SwapchainImageSlot> {
        self.current.slots.get(index as usize).ok_or_else(|| {
            RhiError::InvalidState(format!(
                "image index {index} out of range for {} swapchain images",
                self.current.slots.len()
            ))
        })
    }

    #[inline]
    pub fn slots(&self) -> &[SwapchainImageSlot] {
        &self.current.slots
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.current.swapchain
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.current.resolved.extent
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.current.resolved.surface_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.current.resolved.present_mode
    }

    /// Number of images the driver actually returned.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.current.slots.len() as u32
    }
}

impl std::fmt::Debug for SwapchainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapchainManager")
            .field("swapchain", &self.current.swapchain)
            .field("extent", &self.current.resolved.extent)
            .field("images", &self.current.slots.len())
            .finish()
    }
}
