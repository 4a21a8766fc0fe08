//! Vulkan logical device and queue wrapping.
//!
//! The [`Device`] struct wraps an *already created* logical device together
//! with its queues and the gpu-allocator instance. Instance creation,
//! physical device selection and `vkCreateDevice` itself are the
//! application's bring-up concern; the renderer only needs the results,
//! which are handed over once through [`Device::from_parts`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use blit2d_rhi::device::{Device, QueueFamilyIndices};
//!
//! # fn example(
//! #     instance: &ash::Instance,
//! #     physical_device: vk::PhysicalDevice,
//! #     logical: ash::Device,
//! #     graphics_queue: vk::Queue,
//! #     present_queue: vk::Queue,
//! # ) -> Result<(), blit2d_rhi::RhiError> {
//! let families = QueueFamilyIndices {
//!     graphics: 0,
//!     present: 0,
//! };
//! let device = Device::from_parts(
//!     instance,
//!     physical_device,
//!     logical,
//!     families,
//!     graphics_queue,
//!     present_queue,
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::info;

use crate::error::RhiError;

/// Queue family indices the device was created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Graphics queue family index.
    pub graphics: u32,
    /// Presentation queue family index (may equal `graphics`).
    pub present: u32,
}

/// Vulkan logical device wrapper.
///
/// Owns the logical device handed over by the application and destroys it
/// on drop, together with the gpu-allocator built on top of it. There is
/// exactly one `Device` per rendering session; every GPU-owning type in
/// this crate keeps an `Arc` to it.
///
/// # Thread Safety
///
/// The [`Device`] is designed to be shared using `Arc`. The internal
/// allocator is protected by a `Mutex` for thread-safe memory allocation.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator (thread-safe via Mutex).
    allocator: Mutex<Allocator>,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle.
    present_queue: vk::Queue,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Wraps an existing logical device and its queues.
    ///
    /// Takes ownership of `device`: the wrapper destroys it when dropped.
    /// The gpu-allocator is initialized here, which is the only reason the
    /// instance and physical device handles are needed.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance the device was created from
    /// * `physical_device` - The physical device backing `device`
    /// * `device` - The logical device, ownership transferred
    /// * `queue_families` - Families the queues below belong to
    /// * `graphics_queue` - Queue for command submission
    /// * `present_queue` - Queue for presentation
    ///
    /// # Errors
    ///
    /// Returns an error if allocator initialization fails.
    pub fn from_parts(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_families: QueueFamilyIndices,
        graphics_queue: vk::Queue,
        present_queue: vk::Queue,
    ) -> Result<Arc<Self>, RhiError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!(
            "Device wrapped: graphics family {}, present family {}",
            queue_families.graphics, queue_families.present
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            allocator: Mutex::new(allocator),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the raw logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Waits for all queues on the device to become idle.
    ///
    /// Used at shutdown and before swapchain recreation.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails (device loss).
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| match e {
                    vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
                    other => RhiError::Vulkan(other),
                })?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            // Wait for all operations to complete before cleanup
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // Allocator is dropped automatically when the Mutex is dropped
            // The allocator should be empty at this point (all allocations freed)

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device is Send+Sync
// - vk::PhysicalDevice and vk::Queue are Copy types (handles)
// - Allocator is protected by Mutex
// - QueueFamilyIndices is Copy
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_copy() {
        let families = QueueFamilyIndices {
            graphics: 0,
            present: 1,
        };
        let copy = families;
        assert_eq!(copy, families);
    }

    #[test]
    fn test_device_is_send_sync() {
        // Compile-time check that Device is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
