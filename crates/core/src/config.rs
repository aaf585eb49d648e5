//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working FIFO, single-sampled, depth-stencil enabled setup.
//!
//! ```toml
//! validation = true
//!
//! [window]
//! width = 1280
//! height = 720
//! title = "vkframe"
//!
//! [presentation]
//! surface_format = "B8G8R8A8_UNORM"
//! color_space = "SRGB_NONLINEAR"
//! present_mode = "MAILBOX"
//! samples = 4
//! depth_stencil_format = "D32_SFLOAT"
//! clear_color = [0.1, 0.1, 0.1, 1.0]
//! frame_slots = 2
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Enable the Khronos validation layer.
    pub validation: bool,
    pub window: WindowConfig,
    pub presentation: PresentationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            window: WindowConfig::default(),
            presentation: PresentationConfig::default(),
        }
    }
}

/// Initial window parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "vkframe".to_string(),
        }
    }
}

/// Presentable surface format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SurfaceFormatSetting {
    #[serde(rename = "B8G8R8A8_UNORM")]
    B8G8R8A8Unorm,
    #[serde(rename = "B8G8R8A8_SRGB")]
    B8G8R8A8Srgb,
    #[serde(rename = "R8G8B8A8_UNORM")]
    R8G8B8A8Unorm,
    #[serde(rename = "R8G8B8A8_SRGB")]
    R8G8B8A8Srgb,
    #[serde(rename = "A2B10G10R10_UNORM_PACK32")]
    A2B10G10R10UnormPack32,
}

/// Color space paired with the surface format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ColorSpaceSetting {
    #[serde(rename = "SRGB_NONLINEAR")]
    SrgbNonlinear,
    #[serde(rename = "EXTENDED_SRGB_LINEAR")]
    ExtendedSrgbLinear,
    #[serde(rename = "HDR10_ST2084")]
    Hdr10St2084,
}

/// Presentation engine queueing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PresentModeSetting {
    #[serde(rename = "FIFO")]
    Fifo,
    #[serde(rename = "FIFO_RELAXED")]
    FifoRelaxed,
    #[serde(rename = "MAILBOX")]
    Mailbox,
    #[serde(rename = "IMMEDIATE")]
    Immediate,
}

/// Depth/stencil attachment format, or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DepthStencilSetting {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "D16_UNORM")]
    D16Unorm,
    #[serde(rename = "X8_D24_UNORM_PACK32")]
    X8D24UnormPack32,
    #[serde(rename = "D32_SFLOAT")]
    D32Sfloat,
    #[serde(rename = "S8_UINT")]
    S8Uint,
    #[serde(rename = "D16_UNORM_S8_UINT")]
    D16UnormS8Uint,
    #[serde(rename = "D24_UNORM_S8_UINT")]
    D24UnormS8Uint,
    #[serde(rename = "D32_SFLOAT_S8_UINT")]
    D32SfloatS8Uint,
}

/// Settings for the frame synchronization and presentation engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresentationConfig {
    pub surface_format: SurfaceFormatSetting,
    pub color_space: ColorSpaceSetting,
    pub present_mode: PresentModeSetting,
    /// MSAA sample count; 1 disables multisampling.
    pub samples: u32,
    pub depth_stencil_format: DepthStencilSetting,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// Number of frame slots. Absent means one slot per swapchain image.
    pub frame_slots: Option<u32>,
    /// Upper bound for the per-frame fence wait, in nanoseconds.
    pub fence_timeout_ns: u64,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            surface_format: SurfaceFormatSetting::B8G8R8A8Unorm,
            color_space: ColorSpaceSetting::SrgbNonlinear,
            present_mode: PresentModeSetting::Fifo,
            samples: 1,
            depth_stencil_format: DepthStencilSetting::D24UnormS8Uint,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            frame_slots: None,
            fence_timeout_ns: u64::MAX,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed TOML or unknown keys, and
    /// [`Error::InvalidConfig`] for values the engine cannot use.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only when a path was given and loading it failed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Checks values serde cannot express as types.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first rejected field.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::InvalidConfig {
                field: "window",
                reason: format!(
                    "size must be non-zero, got {}x{}",
                    self.window.width, self.window.height
                ),
            });
        }

        let p = &self.presentation;
        if !p.samples.is_power_of_two() || p.samples > 64 {
            return Err(Error::InvalidConfig {
                field: "presentation.samples",
                reason: format!("{} is not one of 1, 2, 4, 8, 16, 32, 64", p.samples),
            });
        }
        if !(0.0..=1.0).contains(&p.clear_depth) {
            return Err(Error::InvalidConfig {
                field: "presentation.clear_depth",
                reason: format!("{} is outside [0, 1]", p.clear_depth),
            });
        }
        if p.frame_slots == Some(0) {
            return Err(Error::InvalidConfig {
                field: "presentation.frame_slots",
                reason: "at least one frame slot is required".to_string(),
            });
        }
        if p.fence_timeout_ns == 0 {
            return Err(Error::InvalidConfig {
                field: "presentation.fence_timeout_ns",
                reason: "a zero timeout would fail every frame".to_string(),
            });
        }

        Ok(())
    }
}
