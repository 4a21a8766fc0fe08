//! Pipeline handles supplied by the caller.
//!
//! Pipeline and render pass construction is owned by the embedding
//! application; the renderer only records against pre-built handles. The
//! [`PipelineBundle`] collects everything the draw path needs.

use ash::vk;

/// Pre-built pipeline state consumed by [`Renderer2d`](crate::Renderer2d).
///
/// All handles must outlive the renderer; the bundle does not own or destroy
/// them. The pipelines are expected to share `layout`, which must declare:
///
/// - descriptor set 0 using `buffer_set_layout`: binding 0 a uniform buffer
///   visible to the vertex stage ([`Mvp`](crate::shader_data::Mvp)), binding 1
///   a uniform buffer visible to the fragment stage
///   ([`Color`](crate::shader_data::Color))
/// - descriptor set 1 using `image_set_layout`: binding 0 a combined image
///   sampler visible to the fragment stage (used by `texture` only)
/// - a 64-byte vertex-stage push constant range at offset 0
///   ([`PushTransform`](crate::shader_data::PushTransform))
///
/// Vertex input for all three pipelines is
/// [`Vertex2d`](crate::shader_data::Vertex2d) at binding 0. The `line`
/// pipeline uses `LINE_LIST` topology; the other two use `TRIANGLE_LIST`.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBundle {
    /// Shared pipeline layout.
    pub layout: vk::PipelineLayout,
    /// Flat-color triangle pipeline.
    pub rect: vk::Pipeline,
    /// Textured triangle pipeline.
    pub texture: vk::Pipeline,
    /// Flat-color line pipeline.
    pub line: vk::Pipeline,
    /// Descriptor set layout for the per-frame uniform set (set 0).
    pub buffer_set_layout: vk::DescriptorSetLayout,
    /// Descriptor set layout for texture sets (set 1).
    pub image_set_layout: vk::DescriptorSetLayout,
}
