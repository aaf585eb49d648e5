//! Opening and closing the frame's rendering scope.
//!
//! The orchestrator turns the current [`RenderTarget`] and clear values into
//! a dynamic-rendering scope:
//!
//! - without MSAA the swapchain view is the color attachment, cleared and stored
//! - with MSAA the multisampled view is cleared and discarded, and resolves
//!   (average) into the swapchain view
//! - depth and stencil, when present, are cleared and never stored
//!
//! It records into a command buffer someone else began; beginning and ending
//! the command buffer stays with the scheduler.

use ash::vk;
use tracing::debug;

use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::image::DepthStencilAspects;
use vkframe_rhi::rendering::{
    ColorAttachment, DepthAttachment, RenderingConfig, RenderingInfoBundle, StencilAttachment,
};

/// Views a frame renders into.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub extent: vk::Extent2D,
    pub swapchain_view: vk::ImageView,
    pub msaa_view: Option<vk::ImageView>,
    pub depth_stencil: Option<(vk::ImageView, DepthStencilAspects)>,
}

/// Clear values and render-scope construction.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassOrchestrator {
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: u32,
}

impl Default for RenderPassOrchestrator {
    fn default() -> Self {
        Self::new([0.0, 0.0, 0.0, 1.0], 1.0, 0)
    }
}

impl RenderPassOrchestrator {
    pub fn new(clear_color: [f32; 4], clear_depth: f32, clear_stencil: u32) -> Self {
        Self {
            clear_color,
            clear_depth,
            clear_stencil,
        }
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) {
        self.clear_stencil = stencil;
    }

    #[inline]
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    #[inline]
    pub fn clear_depth(&self) -> f32 {
        self.clear_depth
    }

    #[inline]
    pub fn clear_stencil(&self) -> u32 {
        self.clear_stencil
    }

    /// Describes the rendering scope for `target`.
    pub fn build(&self, target: &RenderTarget) -> RenderingInfoBundle {
        let color = match target.msaa_view {
            Some(msaa_view) => ColorAttachment::new(msaa_view)
                .with_clear_color(self.clear_color)
                .resolve_into(target.swapchain_view),
            None => ColorAttachment::new(target.swapchain_view).with_clear_color(self.clear_color),
        };

        let mut config = RenderingConfig::new(target.extent).with_color_attachment(color);

        if let Some((view, aspects)) = target.depth_stencil {
            if aspects.depth {
                config = config
                    .with_depth_attachment(DepthAttachment::new(view).with_clear_depth(self.clear_depth));
            }
            if aspects.stencil {
                config = config.with_stencil_attachment(
                    StencilAttachment::new(view).with_clear_stencil(self.clear_stencil),
                );
            }
        }

        config.build()
    }

    /// Opens the rendering scope on `cmd`.
    pub fn begin_rendering(&self, cmd: &CommandBuffer, target: &RenderTarget) {
        let bundle = self.build(target);
        debug!(
            "Begin rendering {}x{} (msaa={}, depth/stencil={})",
            target.extent.width,
            target.extent.height,
            target.msaa_view.is_some(),
            target.depth_stencil.is_some()
        );
        cmd.begin_rendering(&bundle);
    }

    /// Closes the rendering scope on `cmd`.
    pub fn end_rendering(&self, cmd: &CommandBuffer) {
        cmd.end_rendering();
    }
}
