//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! Frames render without VkRenderPass objects: a [`RenderingConfig`]
//! describes the attachments of one rendering scope and
//! [`RenderingConfig::build`] turns it into a [`RenderingInfoBundle`] that
//! owns the `VkRenderingAttachmentInfo` storage `vkCmdBeginRendering` points
//! into.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::command::CommandBuffer;
//! use vkframe_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//!
//! # fn example(
//! #     msaa_view: vk::ImageView,
//! #     swapchain_view: vk::ImageView,
//! #     depth_view: vk::ImageView,
//! #     cmd: &CommandBuffer,
//! # ) {
//! let color = ColorAttachment::new(msaa_view)
//!     .with_clear_color([0.0, 0.0, 0.0, 1.0])
//!     .resolve_into(swapchain_view);
//!
//! let config = RenderingConfig::new(vk::Extent2D { width: 800, height: 600 })
//!     .with_color_attachment(color)
//!     .with_depth_attachment(DepthAttachment::new(depth_view));
//!
//! let bundle = config.build();
//! cmd.begin_rendering(&bundle);
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// A color attachment of one rendering scope.
///
/// # Default Values
///
/// - `layout`: `COLOR_ATTACHMENT_OPTIMAL`
/// - `load_op`: `CLEAR`
/// - `store_op`: `STORE`
/// - `clear_value`: opaque black
/// - no resolve target
#[derive(Clone)]
pub struct ColorAttachment {
    /// The image view to render to.
    pub image_view: vk::ImageView,
    /// The image layout during rendering.
    pub layout: vk::ImageLayout,
    /// How to load the attachment contents at the start of rendering.
    pub load_op: vk::AttachmentLoadOp,
    /// How to store the attachment contents at the end of rendering.
    pub store_op: vk::AttachmentStoreOp,
    /// Clear value when load_op is CLEAR.
    pub clear_value: vk::ClearColorValue,
    /// Single-sample view the attachment resolves into, or null.
    pub resolve_image_view: vk::ImageView,
    /// Layout of the resolve image during rendering.
    pub resolve_image_layout: vk::ImageLayout,
    /// Resolve mode for multisampled attachments.
    pub resolve_mode: vk::ResolveModeFlags,
}

impl ColorAttachment {
    /// Creates a cleared, stored color attachment.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
            resolve_image_view: vk::ImageView::null(),
            resolve_image_layout: vk::ImageLayout::UNDEFINED,
            resolve_mode: vk::ResolveModeFlags::NONE,
        }
    }

    /// Sets the clear color as RGBA floats.
    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_value = vk::ClearColorValue { float32: color };
        self
    }

    /// Averages this multisampled attachment into `resolve_view` at the end
    /// of the scope.
    ///
    /// The multisampled contents are discarded (`DONT_CARE`), only the
    /// resolved image survives the scope.
    #[inline]
    pub fn resolve_into(mut self, resolve_view: vk::ImageView) -> Self {
        self.store_op = vk::AttachmentStoreOp::DONT_CARE;
        self.resolve_image_view = resolve_view;
        self.resolve_image_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        self.resolve_mode = vk::ResolveModeFlags::AVERAGE;
        self
    }

    /// Returns true if this attachment resolves into another view.
    #[inline]
    pub fn resolves(&self) -> bool {
        self.resolve_image_view != vk::ImageView::null()
    }

    /// Converts this attachment to a `VkRenderingAttachmentInfo`.
    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let mut info = vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: self.clear_value,
            });

        if self.resolves() {
            info = info
                .resolve_image_view(self.resolve_image_view)
                .resolve_image_layout(self.resolve_image_layout)
                .resolve_mode(self.resolve_mode);
        }

        info
    }
}

impl std::fmt::Debug for ColorAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ClearColorValue is a union; every clear this crate records is float32
        let clear_color = unsafe { self.clear_value.float32 };
        f.debug_struct("ColorAttachment")
            .field("image_view", &self.image_view)
            .field("layout", &self.layout)
            .field("load_op", &self.load_op)
            .field("store_op", &self.store_op)
            .field("clear_value", &clear_color)
            .field("resolve_image_view", &self.resolve_image_view)
            .field("resolve_mode", &self.resolve_mode)
            .finish()
    }
}

/// A depth attachment of one rendering scope.
///
/// Cleared on load and discarded on store: depth never outlives the frame.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
}

impl DepthAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_depth: 1.0,
        }
    }

    #[inline]
    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// A stencil attachment of one rendering scope.
///
/// For combined depth-stencil formats the same view is bound as both the
/// depth and the stencil attachment.
#[derive(Clone, Copy, Debug)]
pub struct StencilAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_stencil: u32,
}

impl StencilAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_stencil: 0,
        }
    }

    #[inline]
    pub fn with_clear_stencil(mut self, stencil: u32) -> Self {
        self.clear_stencil = stencil;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 0.0,
                    stencil: self.clear_stencil,
                },
            })
    }
}

/// Attachments and render area of one dynamic rendering scope.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub stencil_attachment: Option<StencilAttachment>,
    pub render_area: vk::Rect2D,
    pub layer_count: u32,
}

impl RenderingConfig {
    /// Creates a single-layer scope covering `extent` from the origin.
    #[inline]
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_attachment: None,
            stencil_attachment: None,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            layer_count: 1,
        }
    }

    #[inline]
    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    #[inline]
    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn with_stencil_attachment(mut self, attachment: StencilAttachment) -> Self {
        self.stencil_attachment = Some(attachment);
        self
    }

    /// Builds the `VkRenderingInfo` backing storage.
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle::new(self)
    }
}

/// A bundle containing `VkRenderingInfo` and its backing data.
///
/// This struct ensures that the attachment info arrays outlive the
/// `VkRenderingInfo` that references them.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    stencil_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
    layer_count: u32,
}

impl RenderingInfoBundle {
    /// Creates a new bundle from a rendering configuration.
    pub fn new(config: &RenderingConfig) -> Self {
        Self {
            color_attachments: config
                .color_attachments
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            depth_attachment: config
                .depth_attachment
                .as_ref()
                .map(DepthAttachment::to_rendering_attachment_info),
            stencil_attachment: config
                .stencil_attachment
                .as_ref()
                .map(StencilAttachment::to_rendering_attachment_info),
            render_area: config.render_area,
            layer_count: config.layer_count,
        }
    }

    /// Returns the `VkRenderingInfo` referencing this bundle's data.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(self.layer_count)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        if let Some(ref stencil) = self.stencil_attachment {
            info = info.stencil_attachment(stencil);
        }

        info
    }

    #[inline]
    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.depth_attachment.as_ref()
    }

    #[inline]
    pub fn stencil_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.stencil_attachment.as_ref()
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    #[inline]
    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn test_color_attachment_default() {
        let attachment = ColorAttachment::new(view(1));
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert!(!attachment.resolves());
        let clear = unsafe { attachment.clear_value.float32 };
        assert_eq!(clear, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_resolve_discards_multisampled_contents() {
        let attachment = ColorAttachment::new(view(1))
            .with_clear_color([0.2, 0.3, 0.4, 1.0])
            .resolve_into(view(2));

        assert!(attachment.resolves());
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);

        let info = attachment.to_rendering_attachment_info();
        assert_eq!(info.image_view, view(1));
        assert_eq!(info.resolve_image_view, view(2));
        assert_eq!(info.resolve_mode, vk::ResolveModeFlags::AVERAGE);
        assert_eq!(
            info.resolve_image_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        let clear = unsafe { info.clear_value.color.float32 };
        assert_eq!(clear, [0.2, 0.3, 0.4, 1.0]);
    }

    #[test]
    fn test_unresolved_info_has_no_resolve_target() {
        let info = ColorAttachment::new(view(5)).to_rendering_attachment_info();
        assert_eq!(info.resolve_image_view, vk::ImageView::null());
        assert_eq!(info.resolve_mode, vk::ResolveModeFlags::NONE);
    }

    #[test]
    fn test_depth_and_stencil_clear_values() {
        let depth = DepthAttachment::new(view(3)).with_clear_depth(0.5);
        let stencil = StencilAttachment::new(view(3)).with_clear_stencil(7);

        let depth_info = depth.to_rendering_attachment_info();
        let stencil_info = stencil.to_rendering_attachment_info();

        assert_eq!(depth_info.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(stencil_info.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(unsafe { depth_info.clear_value.depth_stencil.depth }, 0.5);
        assert_eq!(unsafe { stencil_info.clear_value.depth_stencil.stencil }, 7);
    }

    #[test]
    fn test_rendering_info_bundle() {
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        let config = RenderingConfig::new(extent)
            .with_color_attachment(ColorAttachment::new(view(1)))
            .with_depth_attachment(DepthAttachment::new(view(2)));

        let bundle = config.build();

        assert_eq!(bundle.color_attachments().len(), 1);
        assert!(bundle.depth_attachment().is_some());
        assert!(bundle.stencil_attachment().is_none());
        assert_eq!(bundle.render_area().extent, extent);
        assert_eq!(bundle.render_area().offset, vk::Offset2D { x: 0, y: 0 });

        let info = bundle.info();
        assert_eq!(info.layer_count, 1);
        assert_eq!(info.color_attachment_count, 1);
        assert!(!info.p_depth_attachment.is_null());
        assert!(info.p_stencil_attachment.is_null());
    }

    #[test]
    fn test_rendering_info_bundle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ColorAttachment>();
        assert_send_sync::<RenderingConfig>();
        assert_send_sync::<RenderingInfoBundle>();
    }
}
