//! Shader-facing data structures.
//!
//! Vertex formats, uniform blocks, and push constant payloads shared with the
//! shaders. All GPU-visible types are `#[repr(C)]` and implement
//! [`bytemuck::Pod`] so they can be written to buffers byte-for-byte. The
//! uniform blocks follow std140 layout; field order and sizes here must match
//! the shader declarations.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};

/// A 2D vertex with position and texture coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex2d {
    /// Position in model space.
    pub pos: [f32; 2],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

impl Vertex2d {
    pub const fn new(pos: [f32; 2], uv: [f32; 2]) -> Self {
        Self { pos, uv }
    }

    /// Returns the vertex input binding description for binding 0.
    pub fn binding_description() -> ash::vk::VertexInputBindingDescription {
        ash::vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(ash::vk::VertexInputRate::VERTEX)
    }

    /// Returns the attribute descriptions matching the shader inputs:
    /// location 0 is the position, location 1 the texture coordinates.
    pub fn attribute_descriptions() -> [ash::vk::VertexInputAttributeDescription; 2] {
        [
            ash::vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(ash::vk::Format::R32G32_SFLOAT)
                .offset(0),
            ash::vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(ash::vk::Format::R32G32_SFLOAT)
                .offset(std::mem::size_of::<[f32; 2]>() as u32),
        ]
    }
}

/// Unit quad centered on the origin, spanning -0.5..0.5 on both axes.
///
/// Rects and textures are drawn by scaling and translating this quad with a
/// per-draw model matrix, so the vertex buffer never changes after upload.
pub const UNIT_QUAD_VERTICES: [Vertex2d; 4] = [
    Vertex2d::new([-0.5, -0.5], [0.0, 0.0]),
    Vertex2d::new([0.5, -0.5], [1.0, 0.0]),
    Vertex2d::new([0.5, 0.5], [1.0, 1.0]),
    Vertex2d::new([-0.5, 0.5], [0.0, 1.0]),
];

/// Index list for [`UNIT_QUAD_VERTICES`], two counter-clockwise triangles.
pub const UNIT_QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Unit line segment from the origin to (1, 0).
///
/// A line from p0 to p1 is drawn by mapping the x axis onto p1 - p0 with a
/// per-draw model matrix.
pub const UNIT_LINE_VERTICES: [Vertex2d; 2] = [
    Vertex2d::new([0.0, 0.0], [0.0, 0.0]),
    Vertex2d::new([1.0, 0.0], [1.0, 0.0]),
];

/// Projection and view matrices, bound at set 0 binding 0 (vertex stage).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Mvp {
    pub project: Mat4,
    pub view: Mat4,
}

impl Mvp {
    /// Identity matrices; drawing is a no-op transform until a projection
    /// is set.
    pub fn identity() -> Self {
        Self {
            project: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }

    /// Builds an orthographic projection mapping the given axis-aligned
    /// region to clip space.
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self {
            project: Mat4::orthographic_rh(left, right, bottom, top, near, far),
            view: Mat4::IDENTITY,
        }
    }
}

/// Flat draw color, bound at set 0 binding 1 (fragment stage).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// An axis-aligned rectangle given by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub pos: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub const fn new(pos: Vec2, size: Vec2) -> Self {
        Self { pos, size }
    }

    /// Returns the center of the rectangle.
    #[inline]
    pub fn center(&self) -> Vec2 {
        self.pos + self.size * 0.5
    }
}

/// Per-draw model matrix, pushed as a 64-byte vertex-stage push constant.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushTransform {
    pub model: Mat4,
}

impl PushTransform {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn identity() -> Self {
        Self {
            model: Mat4::IDENTITY,
        }
    }

    /// Transform mapping [`UNIT_QUAD_VERTICES`] onto `rect`.
    pub fn from_rect(rect: &Rect) -> Self {
        let center = rect.center();
        let model = Mat4::from_translation(center.extend(0.0))
            * Mat4::from_scale(rect.size.extend(1.0));
        Self { model }
    }

    /// Transform mapping [`UNIT_LINE_VERTICES`] onto the segment from `p0`
    /// to `p1`.
    pub fn for_line(p0: Vec2, p1: Vec2) -> Self {
        let d = p1 - p0;
        // First column carries the direction so (1, 0) lands on p1.
        let model = Mat4::from_cols(
            Vec4::new(d.x, d.y, 0.0, 0.0),
            Vec4::ZERO,
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(p0.x, p0.y, 0.0, 1.0),
        );
        Self { model }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_vertex2d_layout() {
        assert_eq!(mem::size_of::<Vertex2d>(), 16);
        assert_eq!(mem::align_of::<Vertex2d>(), 4);
    }

    #[test]
    fn test_mvp_matches_std140() {
        // Two column-major mat4s, no padding
        assert_eq!(mem::size_of::<Mvp>(), 128);
    }

    #[test]
    fn test_color_is_vec4_sized() {
        assert_eq!(mem::size_of::<Color>(), 16);
    }

    #[test]
    fn test_push_transform_fits_guaranteed_push_constant_range() {
        // Vulkan guarantees at least 128 bytes of push constants
        assert_eq!(PushTransform::SIZE, 64);
        assert!(PushTransform::SIZE <= 128);
    }

    #[test]
    fn test_rect_transform_maps_unit_quad_to_corners() {
        let rect = Rect::new(Vec2::new(10.0, 20.0), Vec2::new(4.0, 6.0));
        let m = PushTransform::from_rect(&rect).model;

        let top_left = m * Vec4::new(-0.5, -0.5, 0.0, 1.0);
        let bottom_right = m * Vec4::new(0.5, 0.5, 0.0, 1.0);

        assert!((top_left.x - 10.0).abs() < 1e-6);
        assert!((top_left.y - 20.0).abs() < 1e-6);
        assert!((bottom_right.x - 14.0).abs() < 1e-6);
        assert!((bottom_right.y - 26.0).abs() < 1e-6);
    }

    #[test]
    fn test_line_transform_maps_endpoints() {
        let p0 = Vec2::new(3.0, 4.0);
        let p1 = Vec2::new(-1.0, 8.0);
        let m = PushTransform::for_line(p0, p1).model;

        let start = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let end = m * Vec4::new(1.0, 0.0, 0.0, 1.0);

        assert!((start.x - p0.x).abs() < 1e-6);
        assert!((start.y - p0.y).abs() < 1e-6);
        assert!((end.x - p1.x).abs() < 1e-6);
        assert!((end.y - p1.y).abs() < 1e-6);
    }

    #[test]
    fn test_quad_indices_reference_valid_vertices() {
        for &i in &UNIT_QUAD_INDICES {
            assert!((i as usize) < UNIT_QUAD_VERTICES.len());
        }
    }
}
