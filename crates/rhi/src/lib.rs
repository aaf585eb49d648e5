//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - Surface capability queries and swapchain management
//! - Command buffer recording with dynamic rendering and synchronization2
//! - Attachment images backed by `gpu-allocator`
//! - Synchronization primitives
//!
//! Everything above raw Vulkan goes through the [`GpuDevice`] and
//! [`PresentSurface`] traits. With the `mock` feature, [`mock`] provides
//! in-memory implementations for driver-free tests.

mod error;

pub mod command;
pub mod device;
pub mod gpu;
pub mod image;
pub mod instance;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod physical_device;
pub mod rendering;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult, StaleReason};
pub use gpu::{GpuDevice, PresentRequest, PresentSurface, QueueSubmit, SharedDevice};

// Re-export ash types that users might need
pub use ash::vk;
