//! Sampled textures.
//!
//! A [`Texture`] bundles a device-local image with its combined image
//! sampler descriptor set. Pixel data is uploaded once at creation through
//! a staging buffer and a one-shot submission; after that the texture is
//! immutable.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use blit2d_rhi::RhiResult;
use blit2d_rhi::buffer::Buffer;
use blit2d_rhi::command::CommandPool;
use blit2d_rhi::descriptor::{self, DescriptorSetAllocator, SetHandle};
use blit2d_rhi::device::Device;
use blit2d_rhi::image::Image;
use blit2d_rhi::upload;

/// Byte length of a tightly packed RGBA8 pixel buffer.
///
/// Widens before multiplying so dimensions near the `u32` limit cannot
/// overflow the intermediate product.
pub(crate) fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// A GPU texture with its descriptor set.
///
/// Created through [`Renderer2d::create_texture`](crate::Renderer2d::create_texture)
/// and released through
/// [`Renderer2d::destroy_texture`](crate::Renderer2d::destroy_texture), which
/// returns the descriptor set to its pool. Dropping a texture without going
/// through `destroy_texture` frees the image but leaks the descriptor set
/// until the allocator itself is destroyed.
pub struct Texture {
    image: Image,
    set: Option<SetHandle>,
}

impl Texture {
    /// Uploads `pixels` (tightly packed RGBA8, `width * height * 4` bytes)
    /// into a new sampled image and writes its descriptor set.
    ///
    /// The caller has already validated the pixel length. The upload records
    /// both layout transitions and the copy in a single one-shot submission:
    /// UNDEFINED to TRANSFER_DST_OPTIMAL, copy, then TRANSFER_DST_OPTIMAL to
    /// SHADER_READ_ONLY_OPTIMAL.
    pub(crate) fn new(
        device: Arc<Device>,
        upload_pool: &CommandPool,
        descriptors: &mut DescriptorSetAllocator,
        sampler: vk::Sampler,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        debug_assert_eq!(pixels.len(), rgba8_len(width, height));

        let staging = Buffer::new_staging_with_data(device.clone(), pixels)?;
        let image = Image::new_sampled(device.clone(), width, height)?;

        upload::execute_one_shot(upload_pool, |cmd| {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.handle())
                .subresource_range(Image::subresource_range());
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[to_transfer],
            );

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            let to_sampled = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.handle())
                .subresource_range(Image::subresource_range());
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[to_sampled],
            );
        })?;
        // Staging buffer dropped here; the one-shot submission already waited
        // for the queue to go idle.

        let set = descriptors.alloc_image_set()?;
        let infos = [descriptor::image_info(
            sampler,
            image.view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set.set())
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&infos);
        descriptor::update_descriptor_sets(&device, &[write]);

        debug!("Created {}x{} texture", width, height);

        Ok(Self {
            image,
            set: Some(set),
        })
    }

    /// Returns the descriptor set to bind at the texture set slot.
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        // Only None transiently inside destroy_texture
        self.set.as_ref().map(|s| s.set()).unwrap_or_default()
    }

    /// Returns the texture dimensions.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    pub(crate) fn take_set(&mut self) -> Option<SetHandle> {
        self.set.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_len_small() {
        assert_eq!(rgba8_len(2, 3), 24);
        assert_eq!(rgba8_len(1, 1), 4);
    }

    #[test]
    fn test_rgba8_len_does_not_overflow_u32() {
        // 32768 * 32768 * 4 exceeds u32::MAX; the widened product must not
        assert_eq!(rgba8_len(32768, 32768), 4 * 1024 * 1024 * 1024);
    }
}
