//! Platform layer for the vkframe presentation engine.
//!
//! This crate provides:
//! - The application window via winit
//! - A RAII Vulkan surface created through ash-window
//! - The instance extensions surface creation needs

mod window;

pub use window::{Surface, Window, required_extensions};

// Re-export winit types the application loop needs
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
