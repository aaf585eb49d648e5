//! Stale swapchains, rebuilds, timeouts, misuse and the frame runner.

use std::sync::Arc;

use ash::vk;
use vkframe_presentation::{
    Application, AttachmentConfig, FrameInfo, FrameOutcome, FrameRunner, FrameState,
    PresentationScheduler, PresentationSettings, SlotPolicy,
};
use vkframe_rhi::mock::{MockCommand, MockDevice, MockEvent, MockResource, MockSurface};
use vkframe_rhi::{RhiError, RhiResult, SharedDevice, StaleReason};

fn new_scheduler(
    mock: &Arc<MockDevice>,
    surface: &MockSurface,
    settings: PresentationSettings,
) -> RhiResult<PresentationScheduler> {
    let device: SharedDevice = mock.clone();
    PresentationScheduler::new(device, surface, settings)
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

#[test]
fn test_stale_acquire_keeps_fence_signaled() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    run_frame(&mut scheduler).unwrap();
    mock.clear_records();
    mock.fail_next_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR);

    let err = scheduler.begin_frame().unwrap_err();
    assert!(matches!(err, RhiError::SwapchainStale(StaleReason::OutOfDate)));
    assert_eq!(scheduler.state(), FrameState::Idle);
    assert_eq!(scheduler.frame_index(), 1);

    // Waited, but nothing reset or recorded
    let events = mock.events();
    assert!(events.iter().any(|e| matches!(e, MockEvent::FenceWait(_))));
    assert!(!events.iter().any(|e| matches!(e, MockEvent::FenceReset(_))));
    assert!(!events.iter().any(|e| matches!(e, MockEvent::CommandBufferBegin(_))));

    scheduler.rebuild(&surface).unwrap();
    run_frame(&mut scheduler).unwrap();
    assert_eq!(mock.submits().len(), 1);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_suboptimal_acquire_still_presents() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    mock.fail_next_acquire(vk::Result::SUBOPTIMAL_KHR);
    scheduler.begin_frame().unwrap();
    scheduler.begin_rendering().unwrap();
    scheduler.end_rendering().unwrap();

    let err = scheduler.end_frame().unwrap_err();
    assert!(matches!(err, RhiError::SwapchainStale(StaleReason::Suboptimal)));
    assert_eq!(mock.presents().len(), 1);
    assert_eq!(scheduler.state(), FrameState::Idle);
    assert_eq!(scheduler.frame_index(), 1);

    // The flag belongs to that frame only
    run_frame(&mut scheduler).unwrap();
}

#[test]
fn test_out_of_date_present_advances_and_rebuilds() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    mock.fail_next_present(vk::Result::ERROR_OUT_OF_DATE_KHR);
    scheduler.begin_frame().unwrap();
    scheduler.begin_rendering().unwrap();
    scheduler.end_rendering().unwrap();
    let err = scheduler.end_frame().unwrap_err();
    assert!(matches!(err, RhiError::SwapchainStale(StaleReason::OutOfDate)));

    // Submission happened, so the frame counts
    assert_eq!(scheduler.frame_index(), 1);
    assert_eq!(scheduler.state(), FrameState::Idle);

    scheduler.rebuild(&surface).unwrap();
    let creations = mock.swapchain_creations();
    assert_eq!(creations.len(), 2);
    assert_eq!(creations[1].old_swapchain, creations[0].swapchain);
    assert_eq!(mock.live(MockResource::Swapchain), 1);

    for _ in 0..4 {
        run_frame(&mut scheduler).unwrap();
    }
    scheduler.terminate();
    assert_eq!(mock.live_total(), 0);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_rebuild_follows_surface_resize() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, PresentationSettings::default()).unwrap();
    run_frame(&mut scheduler).unwrap();

    surface.set_extent(1024, 768);
    scheduler.rebuild(&surface).unwrap();
    let resized = vk::Extent2D {
        width: 1024,
        height: 768,
    };
    assert_eq!(scheduler.current_extent(), resized);

    mock.clear_records();
    let frame = run_frame(&mut scheduler).unwrap();
    assert_eq!(frame.extent, resized);
    assert_eq!(mock.renderings()[0].render_area.extent, resized);

    // Slots follow the image count, which did not change
    assert_eq!(scheduler.frame_slot_count(), 3);
    // One swapchain, one depth image, three views plus the depth view
    assert_eq!(mock.live(MockResource::Swapchain), 1);
    assert_eq!(mock.live(MockResource::Image), 1);
    assert_eq!(mock.live(MockResource::ImageView), 4);
}

#[test]
fn test_zero_extent_defers_rebuild() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    surface.set_extent(0, 0);
    let err = scheduler.rebuild(&surface).unwrap_err();
    assert!(err.is_stale());

    // Frames are refused until a rebuild succeeds
    let err = scheduler.begin_frame().unwrap_err();
    assert!(matches!(err, RhiError::SwapchainStale(StaleReason::OutOfDate)));
    assert!(mock.submits().is_empty());

    surface.set_extent(640, 480);
    scheduler.rebuild(&surface).unwrap();
    let frame = run_frame(&mut scheduler).unwrap();
    assert_eq!(
        frame.extent,
        vk::Extent2D {
            width: 640,
            height: 480
        }
    );
}

#[test]
fn test_zero_extent_at_creation_is_stale() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(0, 0);
    let err = new_scheduler(&mock, &surface, color_only()).unwrap_err();
    assert!(err.is_stale());
    assert_eq!(mock.live_total(), 0);
}

#[test]
fn test_lost_surface_is_stale() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    mock.fail_next_acquire(vk::Result::ERROR_SURFACE_LOST_KHR);
    let err = scheduler.begin_frame().unwrap_err();
    assert!(matches!(err, RhiError::SwapchainStale(StaleReason::SurfaceLost)));

    surface.set_lost(true);
    let err = scheduler.rebuild(&surface).unwrap_err();
    assert!(matches!(err, RhiError::SwapchainStale(StaleReason::SurfaceLost)));
}

#[test]
fn test_hung_fence_times_out() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let settings = PresentationSettings {
        fence_timeout_ns: 1_000_000,
        ..color_only()
    };
    let mut scheduler = new_scheduler(&mock, &surface, settings).unwrap();
    mock.hang_fences(true);

    // Fresh slots start signaled
    for _ in 0..3 {
        run_frame(&mut scheduler).unwrap();
    }

    let err = scheduler.begin_frame().unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert_eq!(scheduler.state(), FrameState::Idle);
    assert_eq!(scheduler.frame_index(), 0);

    mock.hang_fences(false);
    run_frame(&mut scheduler).unwrap();
    scheduler.terminate();
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_out_of_order_calls_are_rejected_without_side_effects() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    let before = mock.events().len();
    assert!(matches!(scheduler.begin_rendering(), Err(RhiError::InvalidState(_))));
    assert!(matches!(scheduler.end_rendering(), Err(RhiError::InvalidState(_))));
    assert!(matches!(scheduler.end_frame(), Err(RhiError::InvalidState(_))));
    assert!(matches!(scheduler.command_buffer(), Err(RhiError::InvalidState(_))));
    assert_eq!(mock.events().len(), before);
    assert_eq!(scheduler.state(), FrameState::Idle);

    let frame = scheduler.begin_frame().unwrap();
    assert_eq!(scheduler.command_buffer().unwrap(), frame.command_buffer);
    let before = mock.events().len();
    assert!(matches!(scheduler.begin_frame(), Err(RhiError::InvalidState(_))));
    assert!(matches!(scheduler.rebuild(&surface), Err(RhiError::InvalidState(_))));
    assert_eq!(mock.events().len(), before);
    assert_eq!(scheduler.state(), FrameState::Acquired);

    scheduler.begin_rendering().unwrap();
    assert!(matches!(scheduler.end_frame(), Err(RhiError::InvalidState(_))));
    assert!(matches!(scheduler.begin_rendering(), Err(RhiError::InvalidState(_))));
    assert_eq!(scheduler.state(), FrameState::Recording);

    scheduler.end_rendering().unwrap();
    scheduler.end_frame().unwrap();
    assert_eq!(scheduler.state(), FrameState::Idle);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_present_ids_and_waits() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();
    assert_eq!(scheduler.present_id(), 0);
    assert!(scheduler.supports_present_wait());

    for _ in 0..3 {
        run_frame(&mut scheduler).unwrap();
    }
    assert_eq!(scheduler.present_id(), 3);
    let ids: Vec<Option<u64>> = mock.presents().iter().map(|p| p.present_id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

    scheduler.wait_for_present(3, 0).unwrap();
    assert!(scheduler.wait_for_present(4, 0).unwrap_err().is_timeout());
}

#[test]
fn test_present_wait_unsupported() {
    let mock = Arc::new(MockDevice::new().without_present_wait());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    run_frame(&mut scheduler).unwrap();
    assert_eq!(scheduler.present_id(), 1);
    assert_eq!(mock.presents()[0].present_id, None);
    assert!(matches!(
        scheduler.wait_for_present(1, 0),
        Err(RhiError::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_fixed_slot_count() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let settings = PresentationSettings {
        slot_policy: SlotPolicy::Fixed(2),
        ..color_only()
    };
    let mut scheduler = new_scheduler(&mock, &surface, settings).unwrap();
    assert_eq!(scheduler.image_count(), 3);
    assert_eq!(scheduler.frame_slot_count(), 2);

    let indices: Vec<usize> = (0..6)
        .map(|_| run_frame(&mut scheduler).unwrap().frame_index)
        .collect();
    assert_eq!(indices, vec![0, 1, 0, 1, 0, 1]);

    scheduler.rebuild(&surface).unwrap();
    assert_eq!(scheduler.frame_slot_count(), 2);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_pending_settings_apply_on_rebuild() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();
    assert_eq!(scheduler.attachment_config(), AttachmentConfig::ColorOnly);

    scheduler.set_samples(vk::SampleCountFlags::TYPE_4);
    scheduler.set_present_mode(vk::PresentModeKHR::MAILBOX);
    assert_eq!(scheduler.samples(), vk::SampleCountFlags::TYPE_1);

    scheduler.rebuild(&surface).unwrap();
    assert_eq!(scheduler.samples(), vk::SampleCountFlags::TYPE_4);
    assert_eq!(scheduler.present_mode(), vk::PresentModeKHR::MAILBOX);
    assert_eq!(
        mock.swapchain_creations()[1].present_mode,
        vk::PresentModeKHR::MAILBOX
    );

    mock.clear_records();
    run_frame(&mut scheduler).unwrap();
    let color = mock.renderings()[0].color_attachments[0];
    assert_eq!(color.resolve_mode, vk::ResolveModeFlags::AVERAGE);
}

#[test]
fn test_unsupported_pending_settings_leave_scheduler_usable() {
    let mock = Arc::new(
        MockDevice::new().with_sample_counts(
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
        ),
    );
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();

    scheduler.set_samples(vk::SampleCountFlags::TYPE_8);
    let err = scheduler.rebuild(&surface).unwrap_err();
    assert!(matches!(err, RhiError::UnsupportedConfiguration(_)));
    assert_eq!(mock.swapchain_creations().len(), 1);
    assert_eq!(scheduler.attachment_config(), AttachmentConfig::ColorOnly);
    assert_eq!(scheduler.settings().samples, vk::SampleCountFlags::TYPE_1);

    run_frame(&mut scheduler).unwrap();

    // The rejected sample count does not block the next resize
    surface.set_extent(640, 480);
    scheduler.rebuild(&surface).unwrap();
    run_frame(&mut scheduler).unwrap();
}

#[test]
fn test_unsupported_present_mode_or_format_is_reverted() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();
    let format = scheduler.surface_format();
    mock.clear_records();

    scheduler.set_present_mode(vk::PresentModeKHR::SHARED_DEMAND_REFRESH);
    let err = scheduler.rebuild(&surface).unwrap_err();
    assert!(matches!(err, RhiError::UnsupportedConfiguration(_)));
    assert_eq!(scheduler.settings().present_mode, vk::PresentModeKHR::FIFO);
    run_frame(&mut scheduler).unwrap();

    scheduler.set_surface_format(vk::SurfaceFormatKHR {
        format: vk::Format::R16G16B16A16_SFLOAT,
        color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
    });
    let err = scheduler.rebuild(&surface).unwrap_err();
    assert!(matches!(err, RhiError::UnsupportedConfiguration(_)));
    assert_eq!(scheduler.settings().surface_format, format);
    run_frame(&mut scheduler).unwrap();

    // Rejected before anything was waited on or recreated
    assert_eq!(mock.swapchain_creations().len(), 1);
    assert!(!mock.events().iter().any(|e| matches!(e, MockEvent::WaitIdle)));

    surface.set_extent(1024, 768);
    scheduler.rebuild(&surface).unwrap();
    let creation = mock.swapchain_creations()[1];
    assert_eq!(creation.present_mode, vk::PresentModeKHR::FIFO);
    assert_eq!(creation.format, format.format);
    run_frame(&mut scheduler).unwrap();

    scheduler.terminate();
    assert_eq!(mock.live_total(), 0);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_failed_recording_abandons_frame_and_recovers_slot() {
    for command in [MockCommand::Reset, MockCommand::Begin] {
        let mock = Arc::new(MockDevice::new());
        let surface = MockSurface::new(800, 600);
        let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();
        run_frame(&mut scheduler).unwrap();

        mock.fail_next_command(command, vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let err = scheduler.begin_frame().unwrap_err();
        assert!(
            matches!(err, RhiError::VulkanError(vk::Result::ERROR_OUT_OF_HOST_MEMORY)),
            "{command:?}: {err:?}"
        );
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert_eq!(scheduler.frame_index(), 1);

        // The acquired image is lost, so frames wait for a rebuild
        let err = scheduler.begin_frame().unwrap_err();
        assert!(matches!(err, RhiError::SwapchainStale(StaleReason::OutOfDate)));

        // A slot left with a reset, unsubmitted fence would time out here
        scheduler.rebuild(&surface).unwrap();
        for _ in 0..4 {
            run_frame(&mut scheduler).unwrap();
        }

        scheduler.terminate();
        assert_eq!(mock.live_total(), 0, "{command:?}");
        assert!(mock.violations().is_empty(), "{command:?}: {:?}", mock.violations());
    }
}

#[test]
fn test_failed_submit_abandons_frame_until_rebuild() {
    let failures: [fn(&MockDevice); 2] = [
        |mock| mock.fail_next_submit(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
        |mock| mock.fail_next_command(MockCommand::End, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
    ];

    for (case, inject) in failures.into_iter().enumerate() {
        let mock = Arc::new(MockDevice::new());
        let surface = MockSurface::new(800, 600);
        let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();
        run_frame(&mut scheduler).unwrap();
        mock.clear_records();

        inject(&mock);
        scheduler.begin_frame().unwrap();
        scheduler.begin_rendering().unwrap();
        scheduler.end_rendering().unwrap();
        let err = scheduler.end_frame().unwrap_err();
        assert!(
            matches!(err, RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)),
            "case {case}: {err:?}"
        );

        // Nothing was presented and the slot was not consumed
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert_eq!(scheduler.frame_index(), 1);
        assert!(mock.presents().is_empty());
        assert_eq!(scheduler.present_id(), 1);
        let abandoned_fence = mock
            .events()
            .into_iter()
            .find_map(|e| match e {
                MockEvent::FenceReset(fence) => Some(fence),
                _ => None,
            })
            .unwrap();

        let err = scheduler.begin_frame().unwrap_err();
        assert!(matches!(err, RhiError::SwapchainStale(StaleReason::OutOfDate)));
        let err = scheduler.begin_frame().unwrap_err();
        assert!(matches!(err, RhiError::SwapchainStale(StaleReason::OutOfDate)));

        scheduler.rebuild(&surface).unwrap();
        mock.clear_records();
        let frame = run_frame(&mut scheduler).unwrap();
        assert_eq!(frame.frame_index, 1);

        // Slot 1 runs on a replacement fence that was signaled when waited on
        let waited = mock
            .events()
            .into_iter()
            .find_map(|e| match e {
                MockEvent::FenceWait(fence) => Some(fence),
                _ => None,
            })
            .unwrap();
        assert_ne!(waited, abandoned_fence);
        assert_eq!(mock.submits()[0].fence, waited);

        for _ in 0..4 {
            run_frame(&mut scheduler).unwrap();
        }
        scheduler.terminate();
        assert_eq!(mock.live_total(), 0, "case {case}");
        assert!(mock.violations().is_empty(), "case {case}: {:?}", mock.violations());
    }
}

#[test]
fn test_unsupported_format_fails_creation() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let settings = PresentationSettings {
        surface_format: vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        },
        ..color_only()
    };

    let err = new_scheduler(&mock, &surface, settings).unwrap_err();
    assert!(matches!(err, RhiError::UnsupportedConfiguration(_)));
    assert_eq!(mock.live_total(), 0);
}

#[test]
fn test_unsupported_depth_format_fails_creation() {
    let mock = Arc::new(MockDevice::new().without_depth_format(vk::Format::D24_UNORM_S8_UINT));
    let surface = MockSurface::new(800, 600);

    let err = new_scheduler(&mock, &surface, PresentationSettings::default()).unwrap_err();
    assert!(matches!(err, RhiError::UnsupportedConfiguration(_)));
    assert_eq!(mock.live_total(), 0);
}

#[test]
fn test_failed_creation_releases_everything() {
    // Successes before the failure; the depth image is the only image created
    for (kind, successes) in [
        (MockResource::Fence, 1),
        (MockResource::Semaphore, 4),
        (MockResource::Image, 0),
        (MockResource::ImageMemory, 0),
        (MockResource::ImageView, 3),
        (MockResource::CommandPool, 0),
        (MockResource::CommandBuffer, 0),
        (MockResource::Swapchain, 0),
    ] {
        let mock = Arc::new(MockDevice::new());
        mock.fail_creation(kind, successes);
        let surface = MockSurface::new(800, 600);

        let err = new_scheduler(&mock, &surface, PresentationSettings::default()).unwrap_err();
        assert!(matches!(err, RhiError::ResourceCreation(_)), "{kind:?}: {err}");
        assert_eq!(mock.live_total(), 0, "{kind:?} leaked");
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }
}

#[test]
fn test_terminate_is_idempotent() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, PresentationSettings::default()).unwrap();
    run_frame(&mut scheduler).unwrap();

    scheduler.terminate();
    assert_eq!(mock.live_total(), 0);
    scheduler.terminate();
    assert_eq!(mock.live_total(), 0);

    assert!(matches!(scheduler.begin_frame(), Err(RhiError::InvalidState(_))));
    assert!(matches!(scheduler.rebuild(&surface), Err(RhiError::InvalidState(_))));
    drop(scheduler);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_drop_releases_everything() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    {
        let settings = PresentationSettings {
            samples: vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        let mut scheduler = new_scheduler(&mock, &surface, settings).unwrap();
        run_frame(&mut scheduler).unwrap();
        assert!(mock.live_total() > 0);
    }
    assert_eq!(mock.live_total(), 0);
}

/// Clears a few frames, then asks to exit.
#[derive(Default)]
struct CountingApp {
    initialized: bool,
    frames: u32,
    exit_after: u32,
    command_buffers: Vec<vk::CommandBuffer>,
    terminated: bool,
}

impl Application for CountingApp {
    fn init(&mut self, scheduler: &PresentationScheduler) -> anyhow::Result<()> {
        assert_eq!(scheduler.state(), FrameState::Idle);
        self.initialized = true;
        Ok(())
    }

    fn update(&mut self, delta_time: f64, cmd: vk::CommandBuffer) -> bool {
        assert!(delta_time >= 0.0);
        self.frames += 1;
        self.command_buffers.push(cmd);
        self.frames < self.exit_after
    }

    fn terminate(&mut self) {
        self.terminated = true;
    }
}

#[test]
fn test_runner_drives_app_until_exit() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();
    let mut app = CountingApp {
        exit_after: 5,
        ..Default::default()
    };
    let mut runner = FrameRunner::new();
    runner.init(&mut app, &scheduler).unwrap();
    assert!(app.initialized);

    let mut outcomes = Vec::new();
    loop {
        let outcome = runner.run_frame(&mut scheduler, &surface, &mut app).unwrap();
        outcomes.push(outcome);
        if outcome == FrameOutcome::ExitRequested {
            break;
        }
    }
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes[..4].iter().all(|o| *o == FrameOutcome::Presented));
    // The last frame is still submitted and presented
    assert_eq!(mock.presents().len(), 5);
    assert_eq!(runner.frame_count(), 5);
    assert_eq!(app.command_buffers.len(), 5);

    runner.shutdown(&mut scheduler, &mut app);
    assert!(app.terminated);
    assert_eq!(mock.live_total(), 0);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_runner_rebuilds_on_stale_swapchain() {
    let mock = Arc::new(MockDevice::new());
    let surface = MockSurface::new(800, 600);
    let mut scheduler = new_scheduler(&mock, &surface, color_only()).unwrap();
    let mut app = CountingApp {
        exit_after: u32::MAX,
        ..Default::default()
    };
    let mut runner = FrameRunner::new();
    runner.init(&mut app, &scheduler).unwrap();

    mock.fail_next_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR);
    let outcome = runner.run_frame(&mut scheduler, &surface, &mut app).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);
    assert_eq!(app.frames, 0);

    mock.fail_next_present(vk::Result::SUBOPTIMAL_KHR);
    let outcome = runner.run_frame(&mut scheduler, &surface, &mut app).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);
    assert_eq!(app.frames, 1);
    assert_eq!(mock.swapchain_creations().len(), 3);

    surface.set_extent(0, 0);
    mock.fail_next_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR);
    let outcome = runner.run_frame(&mut scheduler, &surface, &mut app).unwrap();
    assert_eq!(outcome, FrameOutcome::RebuildDeferred);
    let outcome = runner.run_frame(&mut scheduler, &surface, &mut app).unwrap();
    assert_eq!(outcome, FrameOutcome::RebuildDeferred);

    surface.set_extent(800, 600);
    let outcome = runner.run_frame(&mut scheduler, &surface, &mut app).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);
    let outcome = runner.run_frame(&mut scheduler, &surface, &mut app).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);

    runner.shutdown(&mut scheduler, &mut app);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}
