//! 2D rendering layer.
//!
//! This crate orchestrates the rendering process:
//! - Frame scheduling and synchronization
//! - The immediate-mode 2D draw API
//! - Texture creation and descriptor binding

pub mod frame_manager;
pub mod pipeline;
pub mod renderer;
pub mod shader_data;
pub mod texture;

pub use frame_manager::{FrameManager, FrameStatus, PresentStatus};
pub use pipeline::PipelineBundle;
pub use renderer::Renderer2d;
pub use texture::Texture;

/// Default number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
