//! Vulkan abstraction layer for the blit2d 2D renderer.
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Logical device and queue wrapping
//! - Synchronization primitives
//! - Command buffer recording
//! - Buffer and image management
//! - Descriptor set pooling and recycling
//! - Swapchain image acquisition and presentation
//!
//! Instance creation, physical device selection, surface handling and
//! swapchain *creation* are the application's concern; this crate consumes
//! their results through [`device::Device::from_parts`] and
//! [`target::RenderTarget::from_parts`].

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod sync;
pub mod target;
pub mod upload;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
