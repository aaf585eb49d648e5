//! Image layout transitions around the render scope.
//!
//! Two barrier lists bracket every frame:
//!
//! - **enter-render**: the swapchain image (and the MSAA image, if any) go
//!   from `UNDEFINED` to `COLOR_ATTACHMENT_OPTIMAL`; the depth/stencil image,
//!   if any, goes from `UNDEFINED` to `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`
//! - **exit-render**: the swapchain image goes from `COLOR_ATTACHMENT_OPTIMAL`
//!   to `PRESENT_SRC_KHR`. Nothing else is presented, so nothing else needs
//!   an exit transition.
//!
//! Transitions from `UNDEFINED` discard previous contents, which is what a
//! cleared attachment wants and avoids a read dependency on the last frame.
//!
//! Barriers for the persistent attachments are built once per swapchain
//! generation. Each frame gets a fresh list with the acquired swapchain image
//! first, so nothing shared is mutated between frames.

use ash::vk;

use crate::attachments::PersistentAttachments;

fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

fn image_barrier(image: vk::Image, aspect_mask: vk::ImageAspectFlags) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect_mask))
}

/// `UNDEFINED -> COLOR_ATTACHMENT_OPTIMAL`, ready for a cleared color write.
pub fn color_attachment_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    image_barrier(image, vk::ImageAspectFlags::COLOR)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .src_stage_mask(vk::PipelineStageFlags2::NONE)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
}

/// `UNDEFINED -> DEPTH_STENCIL_ATTACHMENT_OPTIMAL` for the aspects in `aspect_mask`.
pub fn depth_stencil_barrier(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
) -> vk::ImageMemoryBarrier2<'static> {
    image_barrier(image, aspect_mask)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .src_stage_mask(vk::PipelineStageFlags2::NONE)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

/// `COLOR_ATTACHMENT_OPTIMAL -> PRESENT_SRC_KHR` after the last color write.
pub fn present_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    image_barrier(image, vk::ImageAspectFlags::COLOR)
        .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::NONE)
        .dst_access_mask(vk::AccessFlags2::NONE)
}

/// Builds the enter-render and exit-render barrier lists for one swapchain
/// generation.
#[derive(Debug, Clone, Default)]
pub struct ImageLayoutTransitionPlanner {
    /// Enter-render barriers for the MSAA and depth/stencil images.
    persistent: Vec<vk::ImageMemoryBarrier2<'static>>,
}

impl ImageLayoutTransitionPlanner {
    /// A planner for the given persistent images.
    ///
    /// `depth_stencil` pairs the image with the aspects its format carries.
    pub fn new(
        msaa_color: Option<vk::Image>,
        depth_stencil: Option<(vk::Image, vk::ImageAspectFlags)>,
    ) -> Self {
        let mut persistent = Vec::with_capacity(2);
        if let Some(image) = msaa_color {
            persistent.push(color_attachment_barrier(image));
        }
        if let Some((image, aspect_mask)) = depth_stencil {
            persistent.push(depth_stencil_barrier(image, aspect_mask));
        }
        Self { persistent }
    }

    pub fn from_attachments(attachments: &PersistentAttachments) -> Self {
        Self::new(
            attachments.msaa_color().map(|image| image.image()),
            attachments
                .depth_stencil()
                .map(|ds| (ds.image.image(), ds.aspects.aspect_mask())),
        )
    }

    /// Barriers to record after acquiring `swapchain_image`.
    ///
    /// Element 0 always targets `swapchain_image`.
    pub fn enter_render(&self, swapchain_image: vk::Image) -> Vec<vk::ImageMemoryBarrier2<'static>> {
        let mut barriers = Vec::with_capacity(1 + self.persistent.len());
        barriers.push(color_attachment_barrier(swapchain_image));
        barriers.extend_from_slice(&self.persistent);
        barriers
    }

    /// Barriers to record before presenting `swapchain_image`.
    pub fn exit_render(&self, swapchain_image: vk::Image) -> Vec<vk::ImageMemoryBarrier2<'static>> {
        vec![present_barrier(swapchain_image)]
    }
}

#[cfg(test)]
mod tests {
    use vkframe_rhi::vk::Handle;

    use super::*;

    fn image(raw: u64) -> vk::Image {
        vk::Image::from_raw(raw)
    }

    #[test]
    fn test_color_only_enter_and_exit() {
        let planner = ImageLayoutTransitionPlanner::new(None, None);

        let enter = planner.enter_render(image(7));
        assert_eq!(enter.len(), 1);
        assert_eq!(enter[0].image, image(7));
        assert_eq!(enter[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(enter[0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(enter[0].dst_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(enter[0].dst_access_mask, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);

        let exit = planner.exit_render(image(7));
        assert_eq!(exit.len(), 1);
        assert_eq!(exit[0].image, image(7));
        assert_eq!(exit[0].old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(exit[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(exit[0].src_access_mask, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_msaa_and_depth_follow_swapchain_entry() {
        let planner = ImageLayoutTransitionPlanner::new(
            Some(image(100)),
            Some((
                image(200),
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            )),
        );

        let enter = planner.enter_render(image(1));
        assert_eq!(enter.len(), 3);
        assert_eq!(enter[0].image, image(1));
        assert_eq!(enter[1].image, image(100));
        assert_eq!(enter[1].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(enter[2].image, image(200));
        assert_eq!(
            enter[2].new_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert!(enter[2]
            .dst_stage_mask
            .contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS));

        // Only the presented image leaves the attachment layout
        let exit = planner.exit_render(image(1));
        assert_eq!(exit.len(), 1);
        assert_eq!(exit[0].image, image(1));
    }

    #[test]
    fn test_depth_only_has_no_stencil_aspect() {
        let planner =
            ImageLayoutTransitionPlanner::new(None, Some((image(5), vk::ImageAspectFlags::DEPTH)));
        let enter = planner.enter_render(image(1));

        let depth_entries = enter
            .iter()
            .filter(|b| b.subresource_range.aspect_mask.contains(vk::ImageAspectFlags::DEPTH))
            .count();
        let stencil_entries = enter
            .iter()
            .filter(|b| b.subresource_range.aspect_mask.contains(vk::ImageAspectFlags::STENCIL))
            .count();
        assert_eq!(depth_entries, 1);
        assert_eq!(stencil_entries, 0);
    }

    #[test]
    fn test_each_frame_gets_a_fresh_list() {
        let planner = ImageLayoutTransitionPlanner::new(Some(image(100)), None);
        let first = planner.enter_render(image(1));
        let second = planner.enter_render(image(2));

        assert_eq!(first[0].image, image(1));
        assert_eq!(second[0].image, image(2));
        assert_eq!(first[1].image, second[1].image);
    }

    #[test]
    fn test_whole_subresource_and_no_ownership_transfer() {
        let barrier = color_attachment_barrier(image(3));
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.dst_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.subresource_range.base_mip_level, 0);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(barrier.subresource_range.base_array_layer, 0);
        assert_eq!(barrier.subresource_range.layer_count, 1);
    }
}
