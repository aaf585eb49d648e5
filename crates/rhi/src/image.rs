//! Attachment images and image views.
//!
//! - [`ImageView`] owns a VkImageView over an image someone else owns, such
//!   as a swapchain image
//! - [`AttachmentImage`] owns an image, its device-local memory and a view;
//!   used for the multisampled color target and the depth/stencil target
//! - [`DepthStencilAspects`] classifies depth/stencil formats
//!
//! Memory comes from `gpu-allocator` through [`GpuDevice::bind_image_memory`].

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, SharedDevice};

/// Which aspects a depth/stencil format carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilAspects {
    pub depth: bool,
    pub stencil: bool,
}

impl DepthStencilAspects {
    /// Classifies `format`, or returns `None` if it has neither aspect.
    pub fn from_format(format: vk::Format) -> Option<Self> {
        let (depth, stencil) = match format {
            vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
                (true, false)
            }
            vk::Format::S8_UINT => (false, true),
            vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT => (true, true),
            _ => return None,
        };
        Some(Self { depth, stencil })
    }

    /// Aspect mask used for views and barriers.
    pub fn aspect_mask(self) -> vk::ImageAspectFlags {
        let mut mask = vk::ImageAspectFlags::empty();
        if self.depth {
            mask |= vk::ImageAspectFlags::DEPTH;
        }
        if self.stencil {
            mask |= vk::ImageAspectFlags::STENCIL;
        }
        mask
    }
}

/// Device memory bound to one image.
///
/// Real devices hand out a `gpu-allocator` allocation; test doubles hand out
/// unbacked memory that only tracks its size.
#[derive(Debug)]
pub struct ImageMemory {
    allocation: Option<Allocation>,
    size: u64,
}

impl ImageMemory {
    pub fn from_allocation(allocation: Allocation) -> Self {
        let size = allocation.size();
        Self {
            allocation: Some(allocation),
            size,
        }
    }

    pub fn unbacked(size: u64) -> Self {
        Self {
            allocation: None,
            size,
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_allocation(self) -> Option<Allocation> {
        self.allocation
    }
}

/// Creates a single-mip, single-layer 2D view.
fn create_view(
    device: &dyn GpuDevice,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> ash::prelude::VkResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    device.create_image_view(&view_info)
}

/// An image view over an image owned elsewhere.
pub struct ImageView {
    device: SharedDevice,
    view: vk::ImageView,
}

impl ImageView {
    /// Creates a 2D view of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] naming `label` if the driver refuses.
    pub fn new(
        device: SharedDevice,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
        label: &str,
    ) -> RhiResult<Self> {
        let view = create_view(device.as_ref(), image, format, aspect_mask)
            .map_err(|e| RhiError::creation(label, e))?;
        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
    }
}

impl std::fmt::Debug for ImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ImageView").field(&self.view).finish()
    }
}

/// Parameters of an [`AttachmentImage`].
#[derive(Debug, Clone, Copy)]
pub struct AttachmentImageDesc<'a> {
    /// Name used in logs, errors and allocator reports.
    pub label: &'a str,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub aspect_mask: vk::ImageAspectFlags,
}

/// A device-local render target with one view.
///
/// # Resource Destruction
///
/// Resources are destroyed in the following order:
/// 1. Image view
/// 2. Image
/// 3. Memory allocation
pub struct AttachmentImage {
    device: SharedDevice,
    image: vk::Image,
    view: vk::ImageView,
    memory: Option<ImageMemory>,
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    aspect_mask: vk::ImageAspectFlags,
}

impl AttachmentImage {
    /// Creates the image, binds memory and creates the view.
    ///
    /// Creation is all-or-nothing: if a later step fails, everything created
    /// by earlier steps is released before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidState`] for a zero extent
    /// - [`RhiError::ResourceCreation`] if the image or view cannot be created
    /// - [`RhiError::AllocatorError`] if memory allocation fails
    pub fn new(device: SharedDevice, desc: &AttachmentImageDesc<'_>) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidState(format!(
                "{} extent must be non-zero, got {}x{}",
                desc.label, desc.extent.width, desc.extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = device
            .create_image(&image_info)
            .map_err(|e| RhiError::creation(desc.label, e))?;

        let memory = match device.bind_image_memory(image, desc.label) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_image(image);
                return Err(e);
            }
        };

        let view = match create_view(device.as_ref(), image, desc.format, desc.aspect_mask) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(image);
                device.free_image_memory(memory);
                return Err(RhiError::creation(format!("{} view", desc.label), e));
            }
        };

        info!(
            "Created {}: {}x{} {:?} {:?}",
            desc.label, desc.extent.width, desc.extent.height, desc.format, desc.samples
        );

        Ok(Self {
            device,
            image,
            view,
            memory: Some(memory),
            format: desc.format,
            extent: desc.extent,
            samples: desc.samples,
            aspect_mask: desc.aspect_mask,
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspect_mask
    }
}

impl Drop for AttachmentImage {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
        self.device.destroy_image(self.image);
        if let Some(memory) = self.memory.take() {
            self.device.free_image_memory(memory);
        }
        debug!("Destroyed attachment image {:?}", self.image);
    }
}

impl std::fmt::Debug for AttachmentImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentImage")
            .field("image", &self.image)
            .field("view", &self.view)
            .field("format", &self.format)
            .field("extent", &self.extent)
            .field("samples", &self.samples)
            .finish()
    }
}
