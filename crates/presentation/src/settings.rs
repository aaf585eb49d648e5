//! Presentation settings resolved into Vulkan values.
//!
//! [`PresentationSettings`] is what the scheduler consumes. It is built
//! either from defaults or from a TOML-loaded
//! [`PresentationConfig`](vkframe_core::config::PresentationConfig).

use ash::vk;
use vkframe_core::config::{
    ColorSpaceSetting, DepthStencilSetting, PresentModeSetting, PresentationConfig,
    SurfaceFormatSetting,
};
use vkframe_rhi::{RhiError, RhiResult};

/// Swapchain image count requested from the surface before clamping.
pub const TARGET_MIN_IMAGE_COUNT: u32 = 3;

/// How many frame slots the scheduler keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPolicy {
    /// One slot per swapchain image; the pool follows the image count across rebuilds.
    #[default]
    MatchSwapchain,
    /// A fixed number of slots regardless of the image count.
    Fixed(u32),
}

impl SlotPolicy {
    /// Number of slots for a swapchain with `image_count` images.
    pub fn slot_count(self, image_count: u32) -> u32 {
        match self {
            Self::MatchSwapchain => image_count,
            Self::Fixed(n) => n,
        }
    }
}

/// Everything the scheduler needs to build and drive a swapchain.
#[derive(Debug, Clone, Copy)]
pub struct PresentationSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    /// `TYPE_1` disables multisampling.
    pub samples: vk::SampleCountFlags,
    /// `None` renders without depth or stencil.
    pub depth_stencil_format: Option<vk::Format>,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub slot_policy: SlotPolicy,
    /// Bound on the fence wait and acquire in `begin_frame`, in nanoseconds.
    pub fence_timeout_ns: u64,
    pub target_min_image_count: u32,
    /// Extent used when the surface leaves the choice to the swapchain.
    pub fallback_extent: vk::Extent2D,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::FIFO,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_stencil_format: Some(vk::Format::D24_UNORM_S8_UINT),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            slot_policy: SlotPolicy::MatchSwapchain,
            fence_timeout_ns: u64::MAX,
            target_min_image_count: TARGET_MIN_IMAGE_COUNT,
            fallback_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
        }
    }
}

impl PresentationSettings {
    /// Converts a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedConfiguration`] for a sample count
    /// Vulkan cannot express or a zero fixed slot count.
    pub fn from_config(config: &PresentationConfig, fallback_extent: vk::Extent2D) -> RhiResult<Self> {
        let slot_policy = match config.frame_slots {
            None => SlotPolicy::MatchSwapchain,
            Some(0) => {
                return Err(RhiError::UnsupportedConfiguration(
                    "frame_slots must be at least 1".to_string(),
                ));
            }
            Some(n) => SlotPolicy::Fixed(n),
        };

        Ok(Self {
            surface_format: vk::SurfaceFormatKHR {
                format: surface_format(config.surface_format),
                color_space: color_space(config.color_space),
            },
            present_mode: present_mode(config.present_mode),
            samples: sample_count(config.samples)?,
            depth_stencil_format: depth_stencil_format(config.depth_stencil_format),
            clear_color: config.clear_color,
            clear_depth: config.clear_depth,
            clear_stencil: config.clear_stencil,
            slot_policy,
            fence_timeout_ns: config.fence_timeout_ns,
            target_min_image_count: TARGET_MIN_IMAGE_COUNT,
            fallback_extent,
        })
    }
}

pub fn surface_format(setting: SurfaceFormatSetting) -> vk::Format {
    match setting {
        SurfaceFormatSetting::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        SurfaceFormatSetting::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        SurfaceFormatSetting::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        SurfaceFormatSetting::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        SurfaceFormatSetting::A2B10G10R10UnormPack32 => vk::Format::A2B10G10R10_UNORM_PACK32,
    }
}

pub fn color_space(setting: ColorSpaceSetting) -> vk::ColorSpaceKHR {
    match setting {
        ColorSpaceSetting::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpaceSetting::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        ColorSpaceSetting::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
    }
}

pub fn present_mode(setting: PresentModeSetting) -> vk::PresentModeKHR {
    match setting {
        PresentModeSetting::Fifo => vk::PresentModeKHR::FIFO,
        PresentModeSetting::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentModeSetting::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModeSetting::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

pub fn depth_stencil_format(setting: DepthStencilSetting) -> Option<vk::Format> {
    let format = match setting {
        DepthStencilSetting::None => return None,
        DepthStencilSetting::D16Unorm => vk::Format::D16_UNORM,
        DepthStencilSetting::X8D24UnormPack32 => vk::Format::X8_D24_UNORM_PACK32,
        DepthStencilSetting::D32Sfloat => vk::Format::D32_SFLOAT,
        DepthStencilSetting::S8Uint => vk::Format::S8_UINT,
        DepthStencilSetting::D16UnormS8Uint => vk::Format::D16_UNORM_S8_UINT,
        DepthStencilSetting::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        DepthStencilSetting::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    };
    Some(format)
}

/// Maps a sample count such as 4 to `TYPE_4`.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedConfiguration`] unless `samples` is a power
/// of two between 1 and 64.
pub fn sample_count(samples: u32) -> RhiResult<vk::SampleCountFlags> {
    let flags = match samples {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        other => {
            return Err(RhiError::UnsupportedConfiguration(format!(
                "{other} is not a valid sample count"
            )));
        }
    };
    Ok(flags)
}
