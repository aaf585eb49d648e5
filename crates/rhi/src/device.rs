//! Vulkan logical device, queue and gpu-allocator.
//!
//! [`Device`] is the real [`GpuDevice`]: one logical device with a single
//! graphics + present queue, dynamic rendering and synchronization2 enabled,
//! and `VK_KHR_present_id` / `VK_KHR_present_wait` enabled when the GPU
//! offers both.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::physical_device::select_physical_device;
//! use vkframe_rhi::{SharedDevice, vk};
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), vkframe_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device: SharedDevice = Device::new(instance, &info)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, PoisonError};

use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, PresentRequest, QueueSubmit};
use crate::image::ImageMemory;
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;
use crate::rendering::RenderingInfoBundle;

/// Extensions every device must enable.
const REQUIRED_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Extensions enabled together when the device supports both.
const PRESENT_WAIT_EXTENSIONS: &[&CStr] = &[ash::khr::present_id::NAME, ash::khr::present_wait::NAME];

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across threads as `Arc<dyn GpuDevice>`. The allocator is guarded
/// by a `Mutex`; every other field is immutable after creation.
pub struct Device {
    /// Instance dispatch table, for physical device queries.
    instance: ash::Instance,
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Limits and properties captured at selection time.
    properties: vk::PhysicalDeviceProperties,
    /// GPU memory allocator. Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// The single graphics + present queue.
    queue: vk::Queue,
    queue_family_index: u32,
    swapchain_loader: ash::khr::swapchain::Device,
    present_wait_loader: Option<ash::khr::present_wait::Device>,
}

impl Device {
    /// Creates the logical device and its allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let queue_family_index = physical_device_info.queue_family_index;
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];

        let present_wait = physical_device_info.extensions.present_wait_available();

        let mut extension_names: Vec<*const c_char> =
            REQUIRED_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();
        if present_wait {
            extension_names.extend(PRESENT_WAIT_EXTENSIONS.iter().map(|ext| ext.as_ptr()));
        }

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let mut present_id_features =
            vk::PhysicalDevicePresentIdFeaturesKHR::default().present_id(true);
        let mut present_wait_features =
            vk::PhysicalDevicePresentWaitFeaturesKHR::default().present_wait(true);

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_3);
        if present_wait {
            create_info = create_info
                .push_next(&mut present_id_features)
                .push_next(&mut present_wait_features);
        }

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s), present wait {}",
            extension_names.len(),
            if present_wait { "enabled" } else { "unavailable" }
        );

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        debug!("Queue retrieved from family {}", queue_family_index);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);
        let present_wait_loader =
            present_wait.then(|| ash::khr::present_wait::Device::new(instance.handle(), &device));

        Ok(Arc::new(Self {
            instance: instance.handle().clone(),
            device,
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue,
            queue_family_index,
            swapchain_loader,
            present_wait_loader,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the queue used for submission and presentation.
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }
}

impl GpuDevice for Device {
    fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    fn limits(&self) -> vk::PhysicalDeviceLimits {
        self.properties.limits
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    fn supports_present_wait(&self) -> bool {
        self.present_wait_loader.is_some()
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&create_info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(fence) }
    }

    fn create_command_pool(
        &self,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family_index)
            .flags(flags);
        unsafe { self.device.create_command_pool(&create_info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.begin_command_buffer(buffer, &begin_info) }
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(buffer) }
    }

    fn cmd_pipeline_barrier2(
        &self,
        buffer: vk::CommandBuffer,
        image_barriers: &[vk::ImageMemoryBarrier2<'static>],
    ) {
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(image_barriers);
        unsafe { self.device.cmd_pipeline_barrier2(buffer, &dependency_info) }
    }

    fn cmd_begin_rendering(&self, buffer: vk::CommandBuffer, rendering: &RenderingInfoBundle) {
        unsafe { self.device.cmd_begin_rendering(buffer, &rendering.info()) }
    }

    fn cmd_end_rendering(&self, buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(buffer) }
    }

    fn queue_submit2(&self, submit: &QueueSubmit<'_>) -> VkResult<()> {
        let command_buffer_infos: Vec<vk::CommandBufferSubmitInfo> = submit
            .command_buffers
            .iter()
            .map(|&cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd))
            .collect();

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(submit.wait)
            .command_buffer_infos(&command_buffer_infos)
            .signal_semaphore_infos(submit.signal);

        unsafe {
            self.device
                .queue_submit2(self.queue, &[submit_info], submit.fence)
        }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        unsafe { self.device.create_image(info, None) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn bind_image_memory(&self, image: vk::Image, name: &str) -> RhiResult<ImageMemory> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        let allocation = allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false, // Optimal tiling is not linear
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            if let Err(free_err) = allocator.free(allocation) {
                error!("Failed to free allocation for {}: {}", name, free_err);
            }
            return Err(RhiError::creation(format!("{name} memory binding"), e));
        }

        Ok(ImageMemory::from_allocation(allocation))
    }

    fn free_image_memory(&self, memory: ImageMemory) {
        if let Some(allocation) = memory.into_allocation() {
            let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free image memory: {}", e);
            }
        }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    fn queue_present(&self, request: &PresentRequest) -> VkResult<bool> {
        let wait_semaphores = [request.wait_semaphore];
        let swapchains = [request.swapchain];
        let image_indices = [request.image_index];

        let mut present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_ids = [request.present_id.unwrap_or(0)];
        let mut present_id_info = vk::PresentIdKHR::default().present_ids(&present_ids);
        if request.present_id.is_some() && self.present_wait_loader.is_some() {
            present_info = present_info.push_next(&mut present_id_info);
        }

        unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) }
    }

    fn wait_for_present(
        &self,
        swapchain: vk::SwapchainKHR,
        present_id: u64,
        timeout: u64,
    ) -> VkResult<()> {
        match &self.present_wait_loader {
            Some(loader) => unsafe { loader.wait_for_present(swapchain, present_id, timeout) },
            None => Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device, ash::Instance and the extension loaders are Send+Sync
// - vk::PhysicalDevice and vk::Queue are Copy handles
// - Allocator is protected by Mutex
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
