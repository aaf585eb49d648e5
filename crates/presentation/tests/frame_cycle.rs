//! Frame cycle tests against the mock device.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::vk;
use vkframe_presentation::{FrameInfo, PresentationScheduler, PresentationSettings, SlotPolicy};
use vkframe_rhi::mock::{MockDevice, MockEvent, MockSurface};
use vkframe_rhi::{GpuDevice, RhiResult, SharedDevice};

fn new_scheduler(
    mock: &Arc<MockDevice>,
    surface: &MockSurface,
    settings: PresentationSettings,
) -> PresentationScheduler {
    let device: SharedDevice = mock.clone();
    PresentationScheduler::new(device, surface, settings).expect("scheduler creation")
}

fn color_only() -> PresentationSettings {
    PresentationSettings {
        depth_stencil_format: None,
        ..Default::default()
    }
}

fn run_frame(scheduler: &mut PresentationScheduler) -> RhiResult<FrameInfo> {
    let frame = scheduler.begin_frame()?;
    scheduler.begin_rendering()?;
    scheduler.end_rendering()?;
    scheduler.end_frame()?;
    Ok(frame)
}

/// Images of the most recently created swapchain.
fn swapchain_images(mock: &MockDevice) -> Vec<vk::Image> {
    let creation = mock
        .swapchain_creations()
        .last()
        .cloned()
        .expect("a swapchain was created");
    mock.swapchain_images(creation.swapchain).unwrap()
}

#[test]
fn test_fence_waited_before_slot_reuse() {
    for slots in 2..=4 {
        let mock = Arc::new(MockDevice::new());
        mock.set_fence_delay(5);
        let surface = MockSurface::new(800, 600);
        let settings = PresentationSettings {
            slot_policy: SlotPolicy::Fixed(slots),
            ..color_only()
        };
        let mut scheduler = new_scheduler(&mock, &surface, settings);
        assert_eq!(scheduler.frame_slot_count(), slots as usize);

        for _ in 0..slots * 3 {
            run_frame(&mut scheduler).unwrap();
        }

        // Every reset must follow a wait on the same fence since its last submit
        let mut submitted_unwaited: HashSet<vk::Fence> = HashSet::new();
        let mut waited: HashSet<vk::Fence> = HashSet::new();
        for event in mock.events() {
            match event {
                MockEvent::Submit(fence) => {
                    submitted_unwaited.insert(fence);
                }
                MockEvent::FenceWait(fence) => {
                    submitted_unwaited.remove(&fence);
                    waited.insert(fence);
                }
                MockEvent::FenceReset(fence) => {
                    assert!(
                        !submitted_unwaited.contains(&fence),
                        "{slots} slots: {fence:?} reset before it was waited on"
                    );
                }
                _ => {}
            }
        }
        assert_eq!(waited.len(), slots as usize);

        scheduler.terminate();
        assert!(mock.violations().is_empty(), "{slots} slots: {:?}", mock.violations());
    }
}

#[test]
fn test_fence_reset_only_after_acquire() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only());

    run_frame(&mut scheduler).unwrap();

    let events = mock.events();
    let acquire = events
        .iter()
        .position(|e| matches!(e, MockEvent::Acquire { .. }))
        .unwrap();
    let wait = events
        .iter()
        .position(|e| matches!(e, MockEvent::FenceWait(_)))
        .unwrap();
    let reset = events
        .iter()
        .position(|e| matches!(e, MockEvent::FenceReset(_)))
        .unwrap();
    let begin = events
        .iter()
        .position(|e| matches!(e, MockEvent::CommandBufferBegin(_)))
        .unwrap();

    assert!(wait < acquire);
    assert!(acquire < reset);
    assert!(reset < begin);
}

#[test]
fn test_frame_index_round_robin() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only());
    assert_eq!(scheduler.frame_slot_count(), 3);

    let indices: Vec<usize> = (0..7)
        .map(|_| run_frame(&mut scheduler).unwrap().frame_index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(scheduler.frame_index(), 1);

    // Each slot submits with its own fence, in the same rotation
    let fences: Vec<vk::Fence> = mock.submits().iter().map(|s| s.fence).collect();
    assert_eq!(fences[0], fences[3]);
    assert_eq!(fences[1], fences[4]);
    assert_eq!(fences[2], fences[5]);
    assert_eq!(fences.iter().collect::<HashSet<_>>().len(), 3);
}

#[test]
fn test_out_of_order_acquire_targets_acquired_image() {
    let mock = Arc::new(MockDevice::new());
    mock.queue_acquire_indices([0, 2, 1, 0]);
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only());
    let images = swapchain_images(&mock);

    let frames: Vec<FrameInfo> = (0..4).map(|_| run_frame(&mut scheduler).unwrap()).collect();

    let image_indices: Vec<u32> = frames.iter().map(|f| f.image_index).collect();
    assert_eq!(image_indices, vec![0, 2, 1, 0]);
    let frame_indices: Vec<usize> = frames.iter().map(|f| f.frame_index).collect();
    assert_eq!(frame_indices, vec![0, 1, 2, 0]);

    // Two barrier batches per frame: enter then exit
    let batches = mock.barrier_batches();
    assert_eq!(batches.len(), 8);
    for (frame, pair) in frames.iter().zip(batches.chunks(2)) {
        let expected = images[frame.image_index as usize];
        assert_eq!(pair[0].barriers[0].image, expected);
        assert_eq!(
            pair[0].barriers[0].new_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(pair[1].barriers[0].image, expected);
        assert_eq!(pair[1].barriers[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    let presented: Vec<u32> = mock.presents().iter().map(|p| p.image_index).collect();
    assert_eq!(presented, vec![0, 2, 1, 0]);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_semaphores_chain_acquire_submit_present() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only());

    for _ in 0..4 {
        run_frame(&mut scheduler).unwrap();
    }

    let acquired: Vec<vk::Semaphore> = mock
        .events()
        .iter()
        .filter_map(|e| match e {
            MockEvent::Acquire { semaphore, .. } => Some(*semaphore),
            _ => None,
        })
        .collect();
    let submits = mock.submits();
    let presents = mock.presents();
    assert_eq!(acquired.len(), 4);

    let mut image_semaphores: HashMap<u32, vk::Semaphore> = HashMap::new();
    for ((acquire, submit), present) in acquired.iter().zip(&submits).zip(&presents) {
        assert_eq!(submit.wait.len(), 1);
        assert_eq!(submit.wait[0].0, *acquire);
        assert_eq!(
            submit.wait[0].1,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(submit.signal.len(), 1);
        assert_eq!(submit.signal[0].0, present.wait_semaphore);

        // The present semaphore belongs to the image, not the frame slot
        let previous = image_semaphores.insert(present.image_index, present.wait_semaphore);
        if let Some(previous) = previous {
            assert_eq!(previous, present.wait_semaphore);
        }
        assert_ne!(present.wait_semaphore, *acquire);
    }
}

#[test]
fn test_msaa_resolves_into_swapchain_view() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let settings = PresentationSettings {
        samples: vk::SampleCountFlags::TYPE_4,
        ..color_only()
    };
    let mut scheduler = new_scheduler(&mock, &surface, settings);
    assert_eq!(scheduler.samples(), vk::SampleCountFlags::TYPE_4);

    for _ in 0..3 {
        run_frame(&mut scheduler).unwrap();
    }

    let renderings = mock.renderings();
    assert_eq!(renderings.len(), 3);

    let msaa_view = renderings[0].color_attachments[0].image_view;
    let mut resolve_views = HashSet::new();
    for rendering in &renderings {
        let color = &rendering.color_attachments[0];
        assert_eq!(color.image_view, msaa_view);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(color.resolve_mode, vk::ResolveModeFlags::AVERAGE);
        assert_ne!(color.resolve_image_view, vk::ImageView::null());
        assert_ne!(color.resolve_image_view, msaa_view);
        resolve_views.insert(color.resolve_image_view);
    }
    // One resolve target per swapchain image
    assert_eq!(resolve_views.len(), 3);

    // The MSAA image enters the attachment layout but is never presented
    let batches = mock.barrier_batches();
    assert_eq!(batches[0].barriers.len(), 2);
    assert_eq!(
        batches[0].barriers[1].new_layout,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    );
    assert_eq!(batches[1].barriers.len(), 1);
    assert_eq!(batches[1].barriers[0].image, batches[0].barriers[0].image);
}

#[test]
fn test_depth_only_format_has_no_stencil() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let settings = PresentationSettings {
        depth_stencil_format: Some(vk::Format::D32_SFLOAT),
        ..Default::default()
    };
    let mut scheduler = new_scheduler(&mock, &surface, settings);
    assert_eq!(scheduler.depth_stencil_format(), Some(vk::Format::D32_SFLOAT));

    run_frame(&mut scheduler).unwrap();

    let batches = mock.barrier_batches();
    let enter = &batches[0].barriers;
    let depth = enter
        .iter()
        .filter(|b| {
            b.subresource_range
                .aspect_mask
                .contains(vk::ImageAspectFlags::DEPTH)
        })
        .count();
    let stencil = enter
        .iter()
        .filter(|b| {
            b.subresource_range
                .aspect_mask
                .contains(vk::ImageAspectFlags::STENCIL)
        })
        .count();
    assert_eq!(depth, 1);
    assert_eq!(stencil, 0);

    let renderings = mock.renderings();
    let rendering = &renderings[0];
    assert!(rendering.depth_attachment.is_some());
    assert!(rendering.stencil_attachment.is_none());
}

#[test]
fn test_combined_depth_stencil_attachments() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, PresentationSettings::default());
    scheduler.set_clear_stencil(3);

    run_frame(&mut scheduler).unwrap();

    let batches = mock.barrier_batches();
    let enter = &batches[0].barriers;
    assert_eq!(enter.len(), 2);
    assert_eq!(
        enter[1].subresource_range.aspect_mask,
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
    assert_eq!(
        enter[1].new_layout,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );

    let renderings = mock.renderings();
    let rendering = &renderings[0];
    let depth = rendering.depth_attachment.unwrap();
    let stencil = rendering.stencil_attachment.unwrap();
    assert_eq!(depth.image_view, stencil.image_view);
    assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
    assert_eq!(unsafe { depth.clear_value.depth_stencil.depth }, 1.0);
    assert_eq!(unsafe { stencil.clear_value.depth_stencil.stencil }, 3);
}

#[test]
fn test_ten_frames_end_to_end_without_leaks() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only());
    assert_eq!(scheduler.image_count(), 3);
    assert_eq!(scheduler.frame_slot_count(), 3);

    let frame_indices: Vec<usize> = (0..10)
        .map(|_| run_frame(&mut scheduler).unwrap().frame_index)
        .collect();
    assert_eq!(frame_indices, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);

    assert_eq!(mock.submits().len(), 10);
    assert_eq!(mock.presents().len(), 10);
    assert_eq!(mock.renderings().len(), 10);
    for rendering in mock.renderings() {
        assert_eq!(
            rendering.render_area.extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(rendering.color_attachments.len(), 1);
        assert!(rendering.depth_attachment.is_none());
    }

    scheduler.terminate();
    assert_eq!(mock.live_total(), 0);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}
