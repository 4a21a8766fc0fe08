//! GPU image management.
//!
//! Sampled 2D images for textures. Memory comes from gpu-allocator, the
//! same way buffers do; pixel data reaches the image through a staging
//! buffer and the one-shot upload path.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Sampled 2D image with managed memory and a view.
///
/// Created in `UNDEFINED` layout; the texture upload path transitions it
/// to `TRANSFER_DST_OPTIMAL` for the pixel copy and then to
/// `SHADER_READ_ONLY_OPTIMAL` for sampling.
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// Image view for shader access.
    view: vk::ImageView,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Image extent.
    extent: vk::Extent2D,
    /// Image format.
    format: vk::Format,
}

impl Image {
    /// Creates a device-local sampled image in `R8G8B8A8_SRGB`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    ///
    /// # Errors
    ///
    /// Returns an error if image, memory or view creation fails, or if
    /// either dimension is zero.
    pub fn new_sampled(device: Arc<Device>, width: u32, height: u32) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image extent must be non-zero, got {}x{}",
                width, height
            )));
        }

        let format = vk::Format::R8G8B8A8_SRGB;
        let extent = vk::Extent2D { width, height };

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.handle().create_image(&create_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device
                .allocator()
                .lock()
                .map_err(|_| RhiError::InvalidHandle("allocator mutex poisoned".to_string()))?;
            allocator.allocate(&AllocationCreateDesc {
                name: "sampled image",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(Self::subresource_range());

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!("Created sampled image: {}x{}", width, height);

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            extent,
            format,
        })
    }

    /// The full-color subresource range this module always uses.
    pub fn subresource_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view handle.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }

        if let Some(allocation) = self.allocation.take() {
            if let Ok(mut allocator) = self.device.allocator().lock() {
                if let Err(e) = allocator.free(allocation) {
                    tracing::error!("Failed to free image allocation: {:?}", e);
                }
            }
        }

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }

        debug!("Destroyed sampled image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subresource_range_covers_single_mip() {
        let range = Image::subresource_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
    }

    #[test]
    fn test_image_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Image>();
    }
}
