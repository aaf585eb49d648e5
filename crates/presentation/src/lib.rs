//! Frame synchronization and presentation.
//!
//! This crate turns a device and a surface into a steady stream of presented
//! frames:
//! - Frame slots (command buffer, fence, acquire semaphore) in round robin
//! - Image layout transitions around the render scope
//! - Dynamic-rendering scope with optional MSAA resolve and depth/stencil
//! - The scheduler state machine tying acquire, submit and present together
//! - An application hook and a frame runner that handles stale swapchains

pub mod application;
pub mod attachments;
pub mod frame_slot;
pub mod render_pass;
pub mod scheduler;
pub mod settings;
pub mod transition;

pub use application::{Application, FrameOutcome, FrameRunner};
pub use attachments::AttachmentConfig;
pub use scheduler::{FrameInfo, FrameState, PresentationScheduler};
pub use settings::{PresentationSettings, SlotPolicy};
