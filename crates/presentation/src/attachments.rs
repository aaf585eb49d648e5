//! Optional multisample and depth/stencil attachments.
//!
//! [`AttachmentConfig`] is decided once from the requested sample count and
//! depth/stencil format, after checking both against the device. The render
//! path matches on it instead of testing handles for null.
//!
//! [`PersistentAttachments`] holds the images themselves: at most one MSAA
//! color image and one depth/stencil image, shared by every frame and
//! recreated with each swapchain generation.

use ash::vk;
use tracing::info;

use vkframe_rhi::image::{AttachmentImage, AttachmentImageDesc, DepthStencilAspects};
use vkframe_rhi::{GpuDevice, RhiError, RhiResult, SharedDevice};

/// A validated depth/stencil format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilTarget {
    pub format: vk::Format,
    pub aspects: DepthStencilAspects,
}

/// Which attachments a frame renders into besides the swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentConfig {
    /// Render straight into the swapchain image.
    ColorOnly,
    /// Render into a multisampled image and resolve into the swapchain image.
    ColorMsaa { samples: vk::SampleCountFlags },
    ColorDepthStencil { depth_stencil: DepthStencilTarget },
    ColorMsaaDepthStencil {
        samples: vk::SampleCountFlags,
        depth_stencil: DepthStencilTarget,
    },
}

impl AttachmentConfig {
    /// Validates `samples` and `depth_stencil_format` against `device`.
    ///
    /// `TYPE_1` means no multisampling; `None` or `UNDEFINED` means no
    /// depth/stencil.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedConfiguration`] if:
    /// - the sample count is not supported for color framebuffers
    /// - the sample count is not supported for the depth or stencil aspect in use
    /// - the format is not a depth/stencil format
    /// - the format cannot be used as an optimal-tiling depth/stencil attachment
    pub fn resolve(
        device: &dyn GpuDevice,
        samples: vk::SampleCountFlags,
        depth_stencil_format: Option<vk::Format>,
    ) -> RhiResult<Self> {
        let limits = device.limits();

        if samples.as_raw().count_ones() != 1 {
            return Err(RhiError::UnsupportedConfiguration(format!(
                "{samples:?} is not a single sample count"
            )));
        }
        if !limits.framebuffer_color_sample_counts.contains(samples) {
            return Err(RhiError::UnsupportedConfiguration(format!(
                "{samples:?} not in supported color sample counts {:?}",
                limits.framebuffer_color_sample_counts
            )));
        }

        let depth_stencil = match depth_stencil_format {
            None | Some(vk::Format::UNDEFINED) => None,
            Some(format) => Some(Self::check_depth_stencil(device, &limits, format, samples)?),
        };

        let msaa = samples != vk::SampleCountFlags::TYPE_1;
        Ok(match (msaa, depth_stencil) {
            (false, None) => Self::ColorOnly,
            (true, None) => Self::ColorMsaa { samples },
            (false, Some(depth_stencil)) => Self::ColorDepthStencil { depth_stencil },
            (true, Some(depth_stencil)) => Self::ColorMsaaDepthStencil {
                samples,
                depth_stencil,
            },
        })
    }

    fn check_depth_stencil(
        device: &dyn GpuDevice,
        limits: &vk::PhysicalDeviceLimits,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<DepthStencilTarget> {
        let aspects = DepthStencilAspects::from_format(format).ok_or_else(|| {
            RhiError::UnsupportedConfiguration(format!("{format:?} is not a depth/stencil format"))
        })?;

        if aspects.depth && !limits.framebuffer_depth_sample_counts.contains(samples) {
            return Err(RhiError::UnsupportedConfiguration(format!(
                "{samples:?} not in supported depth sample counts {:?}",
                limits.framebuffer_depth_sample_counts
            )));
        }
        if aspects.stencil && !limits.framebuffer_stencil_sample_counts.contains(samples) {
            return Err(RhiError::UnsupportedConfiguration(format!(
                "{samples:?} not in supported stencil sample counts {:?}",
                limits.framebuffer_stencil_sample_counts
            )));
        }

        let features = device.format_properties(format).optimal_tiling_features;
        if !features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT) {
            return Err(RhiError::UnsupportedConfiguration(format!(
                "{format:?} cannot be used as a depth/stencil attachment"
            )));
        }

        Ok(DepthStencilTarget { format, aspects })
    }

    /// Sample count of every attachment in the scope.
    pub fn samples(&self) -> vk::SampleCountFlags {
        match *self {
            Self::ColorOnly | Self::ColorDepthStencil { .. } => vk::SampleCountFlags::TYPE_1,
            Self::ColorMsaa { samples } | Self::ColorMsaaDepthStencil { samples, .. } => samples,
        }
    }

    pub fn is_multisampled(&self) -> bool {
        matches!(self, Self::ColorMsaa { .. } | Self::ColorMsaaDepthStencil { .. })
    }

    pub fn depth_stencil(&self) -> Option<DepthStencilTarget> {
        match *self {
            Self::ColorOnly | Self::ColorMsaa { .. } => None,
            Self::ColorDepthStencil { depth_stencil }
            | Self::ColorMsaaDepthStencil { depth_stencil, .. } => Some(depth_stencil),
        }
    }
}

/// The depth/stencil image together with the aspects it carries.
#[derive(Debug)]
pub struct DepthStencilImage {
    pub image: AttachmentImage,
    pub aspects: DepthStencilAspects,
}

/// Attachments that live for one swapchain generation.
#[derive(Debug)]
pub struct PersistentAttachments {
    msaa_color: Option<AttachmentImage>,
    depth_stencil: Option<DepthStencilImage>,
}

impl PersistentAttachments {
    /// Creates the images `config` calls for at `extent`.
    ///
    /// The MSAA image uses `color_format`, the swapchain's format, so it can
    /// resolve into the swapchain image.
    pub fn new(
        device: &SharedDevice,
        config: AttachmentConfig,
        color_format: vk::Format,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let samples = config.samples();

        let msaa_color = if config.is_multisampled() {
            Some(AttachmentImage::new(
                device.clone(),
                &AttachmentImageDesc {
                    label: "msaa color attachment",
                    format: color_format,
                    extent,
                    samples,
                    usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                },
            )?)
        } else {
            None
        };

        // On failure `msaa_color` drops here and releases its image
        let depth_stencil = match config.depth_stencil() {
            Some(target) => Some(DepthStencilImage {
                image: AttachmentImage::new(
                    device.clone(),
                    &AttachmentImageDesc {
                        label: "depth/stencil attachment",
                        format: target.format,
                        extent,
                        samples,
                        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                            | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                        aspect_mask: target.aspects.aspect_mask(),
                    },
                )?,
                aspects: target.aspects,
            }),
            None => None,
        };

        info!(
            "Persistent attachments ready: msaa={}, depth/stencil={:?}",
            msaa_color.is_some(),
            config.depth_stencil().map(|t| t.format)
        );

        Ok(Self {
            msaa_color,
            depth_stencil,
        })
    }

    #[inline]
    pub fn msaa_color(&self) -> Option<&AttachmentImage> {
        self.msaa_color.as_ref()
    }

    #[inline]
    pub fn depth_stencil(&self) -> Option<&DepthStencilImage> {
        self.depth_stencil.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vkframe_rhi::mock::{MockDevice, MockResource};

    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 320,
        height: 240,
    };

    #[test]
    fn test_resolve_variants() {
        let mock = MockDevice::new();
        let t1 = vk::SampleCountFlags::TYPE_1;
        let t4 = vk::SampleCountFlags::TYPE_4;

        assert_eq!(
            AttachmentConfig::resolve(&mock, t1, None).unwrap(),
            AttachmentConfig::ColorOnly
        );
        assert_eq!(
            AttachmentConfig::resolve(&mock, t1, Some(vk::Format::UNDEFINED)).unwrap(),
            AttachmentConfig::ColorOnly
        );
        assert_eq!(
            AttachmentConfig::resolve(&mock, t4, None).unwrap(),
            AttachmentConfig::ColorMsaa { samples: t4 }
        );

        let config = AttachmentConfig::resolve(&mock, t4, Some(vk::Format::D32_SFLOAT)).unwrap();
        assert!(config.is_multisampled());
        let target = config.depth_stencil().unwrap();
        assert!(target.aspects.depth);
        assert!(!target.aspects.stencil);
    }

    #[test]
    fn test_unsupported_sample_count() {
        let mock = MockDevice::new().with_sample_counts(
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
            vk::SampleCountFlags::TYPE_1,
        );

        let err = AttachmentConfig::resolve(&mock, vk::SampleCountFlags::TYPE_8, None).unwrap_err();
        assert!(matches!(err, RhiError::UnsupportedConfiguration(_)));

        // Color supports 4x but depth does not
        let err = AttachmentConfig::resolve(
            &mock,
            vk::SampleCountFlags::TYPE_4,
            Some(vk::Format::D24_UNORM_S8_UINT),
        )
        .unwrap_err();
        assert!(matches!(err, RhiError::UnsupportedConfiguration(ref msg) if msg.contains("depth")));
    }

    #[test]
    fn test_unusable_depth_format() {
        let mock = MockDevice::new().without_depth_format(vk::Format::D32_SFLOAT_S8_UINT);
        let t1 = vk::SampleCountFlags::TYPE_1;

        assert!(AttachmentConfig::resolve(&mock, t1, Some(vk::Format::D32_SFLOAT_S8_UINT)).is_err());
        assert!(AttachmentConfig::resolve(&mock, t1, Some(vk::Format::R8G8B8A8_UNORM)).is_err());
    }

    #[test]
    fn test_persistent_attachments_follow_config() {
        let mock = Arc::new(MockDevice::new());
        let device: SharedDevice = mock.clone();

        let config = AttachmentConfig::resolve(
            mock.as_ref(),
            vk::SampleCountFlags::TYPE_4,
            Some(vk::Format::D24_UNORM_S8_UINT),
        )
        .unwrap();
        let attachments =
            PersistentAttachments::new(&device, config, vk::Format::B8G8R8A8_UNORM, EXTENT).unwrap();

        let msaa = attachments.msaa_color().unwrap();
        assert_eq!(msaa.samples(), vk::SampleCountFlags::TYPE_4);
        assert_eq!(msaa.format(), vk::Format::B8G8R8A8_UNORM);
        let depth = attachments.depth_stencil().unwrap();
        assert_eq!(
            depth.image.aspect_mask(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(mock.live(MockResource::Image), 2);

        drop(attachments);
        assert_eq!(mock.live_total(), 0);
    }

    #[test]
    fn test_color_only_creates_nothing() {
        let mock = Arc::new(MockDevice::new());
        let device: SharedDevice = mock.clone();

        let attachments = PersistentAttachments::new(
            &device,
            AttachmentConfig::ColorOnly,
            vk::Format::B8G8R8A8_UNORM,
            EXTENT,
        )
        .unwrap();

        assert!(attachments.msaa_color().is_none());
        assert!(attachments.depth_stencil().is_none());
        assert_eq!(mock.live_total(), 0);
    }

    #[test]
    fn test_depth_failure_releases_msaa_image() {
        let mock = Arc::new(MockDevice::new());
        let device: SharedDevice = mock.clone();
        mock.fail_creation(MockResource::Image, 1);

        let config = AttachmentConfig::ColorMsaaDepthStencil {
            samples: vk::SampleCountFlags::TYPE_4,
            depth_stencil: DepthStencilTarget {
                format: vk::Format::D32_SFLOAT,
                aspects: DepthStencilAspects {
                    depth: true,
                    stencil: false,
                },
            },
        };
        assert!(
            PersistentAttachments::new(&device, config, vk::Format::B8G8R8A8_UNORM, EXTENT)
                .is_err()
        );
        assert_eq!(mock.live_total(), 0);
    }
}
