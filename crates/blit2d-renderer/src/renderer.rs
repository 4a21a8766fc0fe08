//! The 2D drawing facade.
//!
//! [`Renderer2d`] ties the frame scheduler, descriptor allocation, and static
//! geometry together behind a small immediate-mode API: bracket a frame with
//! [`start_frame`](Renderer2d::start_frame) and
//! [`end_frame`](Renderer2d::end_frame), and issue
//! [`draw_rect`](Renderer2d::draw_rect),
//! [`draw_texture`](Renderer2d::draw_texture), and
//! [`draw_line`](Renderer2d::draw_line) calls in between.
//!
//! # Overview
//!
//! All geometry is static: a unit quad and a unit line segment uploaded once
//! at startup. Each draw call pushes a 64-byte model matrix instead of
//! writing vertex data, so the per-frame fast path allocates nothing and
//! never touches GPU memory from the CPU.
//!
//! The projection and draw color live in per-slot uniform buffers, one pair
//! per frame in flight. [`set_projection`](Renderer2d::set_projection) and
//! [`set_draw_color`](Renderer2d::set_draw_color) rewrite every slot through
//! the synchronous upload path, so they must be called outside the frame
//! bracket.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use glam::Vec2;
//! use blit2d_rhi::device::Device;
//! use blit2d_rhi::target::RenderTarget;
//! use blit2d_renderer::{FrameStatus, PresentStatus, Renderer2d};
//! use blit2d_renderer::pipeline::PipelineBundle;
//! use blit2d_renderer::shader_data::{Color, Rect};
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     pipelines: PipelineBundle,
//! #     target: &RenderTarget,
//! # ) -> blit2d_core::Result<()> {
//! let mut renderer = Renderer2d::new(device, pipelines, 2)?;
//! renderer.set_projection(0.0, 800.0, 0.0, 600.0, -1.0, 1.0)?;
//! renderer.set_draw_color(Color::new(1.0, 0.2, 0.2, 1.0))?;
//!
//! if let FrameStatus::Ready { .. } = renderer.start_frame(target)? {
//!     renderer.draw_rect(&Rect::new(Vec2::new(100.0, 100.0), Vec2::new(50.0, 80.0)));
//!     renderer.draw_line(Vec2::new(0.0, 0.0), Vec2::new(800.0, 600.0));
//!     if renderer.end_frame(target)? == PresentStatus::SwapchainStale {
//!         // Recreate the target, then renderer.handle_target_change()?
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use glam::Vec2;
use tracing::{debug, error, info};

use blit2d_core::{Error, Result};
use blit2d_rhi::RhiResult;
use blit2d_rhi::buffer::{Buffer, BufferUsage};
use blit2d_rhi::command::{CommandBuffer, CommandPool};
use blit2d_rhi::descriptor::{self, DescriptorSetAllocator, SetHandle};
use blit2d_rhi::device::Device;
use blit2d_rhi::target::RenderTarget;
use blit2d_rhi::upload;

use crate::frame_manager::{FrameManager, FrameStatus, PresentStatus};
use crate::pipeline::PipelineBundle;
use crate::shader_data::{
    Color, Mvp, PushTransform, Rect, UNIT_LINE_VERTICES, UNIT_QUAD_INDICES, UNIT_QUAD_VERTICES,
};
use crate::texture::Texture;

const MVP_SIZE: vk::DeviceSize = std::mem::size_of::<Mvp>() as vk::DeviceSize;
const COLOR_SIZE: vk::DeviceSize = std::mem::size_of::<Color>() as vk::DeviceSize;

/// Background clear color for every frame.
const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// Immediate-mode 2D renderer.
///
/// Owns the frame scheduler, command pools, descriptor allocation, the
/// static quad and line geometry, and the per-slot uniform ring. Pipeline
/// and render pass construction stays with the caller via
/// [`PipelineBundle`].
pub struct Renderer2d {
    device: Arc<Device>,
    frames: FrameManager,
    /// Kept alive for the per-frame command buffers allocated from it.
    _command_pool: CommandPool,
    /// Transient pool for one-shot uploads.
    upload_pool: CommandPool,
    descriptors: DescriptorSetAllocator,
    pipelines: PipelineBundle,
    sampler: vk::Sampler,

    quad_vertices: Buffer,
    quad_indices: Buffer,
    line_vertices: Buffer,

    /// Per-slot staging and device-local uniform buffers.
    mvp_stagings: Vec<Buffer>,
    mvp_buffers: Vec<Buffer>,
    color_stagings: Vec<Buffer>,
    color_buffers: Vec<Buffer>,
    /// One uniform set per frame slot, written once at startup.
    frame_sets: Vec<SetHandle>,

    mvp: Mvp,
    draw_color: Color,
    /// True between `start_frame` returning `Ready` and `end_frame`.
    recording: bool,
}

impl Renderer2d {
    /// Creates a renderer with `frames_in_flight` frame slots.
    ///
    /// Uploads the static geometry, allocates one uniform set per slot, and
    /// writes the initial projection (identity) and draw color (white) into
    /// every slot.
    ///
    /// # Errors
    ///
    /// Returns an error if any GPU resource creation or the initial uploads
    /// fail.
    pub fn new(
        device: Arc<Device>,
        pipelines: PipelineBundle,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let graphics_family = device.queue_families().graphics;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let upload_pool = CommandPool::new_transient(device.clone(), graphics_family)?;

        let frames = FrameManager::new(device.clone(), &command_pool, frames_in_flight)?;

        let mut descriptors = DescriptorSetAllocator::new(
            device.clone(),
            frames_in_flight as u32,
            pipelines.buffer_set_layout,
            pipelines.image_set_layout,
        )?;

        let sampler = create_sampler(&device)?;

        let quad_vertices = upload_static(
            device.clone(),
            &upload_pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&UNIT_QUAD_VERTICES),
        )?;
        let quad_indices = upload_static(
            device.clone(),
            &upload_pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&UNIT_QUAD_INDICES),
        )?;
        let line_vertices = upload_static(
            device.clone(),
            &upload_pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&UNIT_LINE_VERTICES),
        )?;

        let mut mvp_stagings = Vec::with_capacity(frames_in_flight);
        let mut mvp_buffers = Vec::with_capacity(frames_in_flight);
        let mut color_stagings = Vec::with_capacity(frames_in_flight);
        let mut color_buffers = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            mvp_stagings.push(Buffer::new(device.clone(), BufferUsage::Staging, MVP_SIZE)?);
            mvp_buffers.push(Buffer::new(device.clone(), BufferUsage::Uniform, MVP_SIZE)?);
            color_stagings.push(Buffer::new(
                device.clone(),
                BufferUsage::Staging,
                COLOR_SIZE,
            )?);
            color_buffers.push(Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                COLOR_SIZE,
            )?);
        }

        let frame_sets = descriptors.alloc_buffer_sets(frames_in_flight as u32)?;
        for (i, set) in frame_sets.iter().enumerate() {
            let mvp_infos = [descriptor::buffer_info(mvp_buffers[i].handle(), 0, MVP_SIZE)];
            let color_infos = [descriptor::buffer_info(
                color_buffers[i].handle(),
                0,
                COLOR_SIZE,
            )];
            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(set.set())
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&mvp_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(set.set())
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&color_infos),
            ];
            descriptor::update_descriptor_sets(&device, &writes);
        }

        let mut renderer = Self {
            device,
            frames,
            _command_pool: command_pool,
            upload_pool,
            descriptors,
            pipelines,
            sampler,
            quad_vertices,
            quad_indices,
            line_vertices,
            mvp_stagings,
            mvp_buffers,
            color_stagings,
            color_buffers,
            frame_sets,
            mvp: Mvp::identity(),
            draw_color: Color::WHITE,
            recording: false,
        };
        renderer.flush_mvp()?;
        renderer.flush_color()?;

        info!("Renderer created with {} frames in flight", frames_in_flight);

        Ok(renderer)
    }

    /// Sets an orthographic projection covering the given region.
    ///
    /// Rewrites the uniform buffer of every frame slot, so it must not be
    /// called between `start_frame` and `end_frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub fn set_projection(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Result<()> {
        debug_assert!(!self.recording, "set_projection inside a frame bracket");
        self.mvp = Mvp::orthographic(left, right, bottom, top, near, far);
        self.flush_mvp()?;
        Ok(())
    }

    /// Sets the flat color used by `draw_rect` and `draw_line`.
    ///
    /// Rewrites the uniform buffer of every frame slot, so it must not be
    /// called between `start_frame` and `end_frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub fn set_draw_color(&mut self, color: Color) -> Result<()> {
        debug_assert!(!self.recording, "set_draw_color inside a frame bracket");
        self.draw_color = color;
        self.flush_color()?;
        Ok(())
    }

    /// Begins a frame: acquires a swapchain image and opens the render pass
    /// with the clear color.
    ///
    /// On [`FrameStatus::SwapchainStale`] no state changes; recreate the
    /// target, call [`handle_target_change`](Self::handle_target_change),
    /// and retry.
    ///
    /// # Errors
    ///
    /// Returns an error on fence timeout, device loss, or any Vulkan failure
    /// other than a stale swapchain.
    pub fn start_frame(&mut self, target: &RenderTarget) -> Result<FrameStatus> {
        debug_assert!(!self.recording, "start_frame called twice");

        let status = self.frames.start_frame(target)?;
        if let FrameStatus::Ready { image_index } = status {
            let cmd = self.frames.current_slot().command_buffer();
            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            }];
            let render_area = vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: target.extent(),
            };
            cmd.begin_render_pass(
                target.render_pass(),
                target.framebuffer(image_index),
                render_area,
                &clear_values,
            );
            self.recording = true;
        }
        Ok(status)
    }

    /// Ends the frame: closes the render pass, submits, and presents.
    ///
    /// # Errors
    ///
    /// Returns an error if submission or presentation fails for a reason
    /// other than a stale swapchain.
    pub fn end_frame(&mut self, target: &RenderTarget) -> Result<PresentStatus> {
        debug_assert!(self.recording, "end_frame without start_frame");

        self.frames.current_slot().command_buffer().end_render_pass();
        self.recording = false;
        let status = self.frames.end_frame(target)?;
        Ok(status)
    }

    /// Draws a flat-colored rectangle.
    ///
    /// Must be called between `start_frame` and `end_frame`.
    pub fn draw_rect(&self, rect: &Rect) {
        debug_assert!(self.recording, "draw_rect outside a frame bracket");

        let cmd = self.frames.current_slot().command_buffer();
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipelines.rect);
        self.bind_quad(cmd);
        self.bind_frame_set(cmd);
        cmd.push_constants(
            self.pipelines.layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            &PushTransform::from_rect(rect),
        );
        cmd.draw_indexed(UNIT_QUAD_INDICES.len() as u32, 1, 0, 0, 0);
    }

    /// Draws a texture stretched over `rect`.
    ///
    /// Must be called between `start_frame` and `end_frame`. The texture
    /// must have been created by this renderer and not yet destroyed.
    pub fn draw_texture(&self, rect: &Rect, texture: &Texture) {
        debug_assert!(self.recording, "draw_texture outside a frame bracket");

        let cmd = self.frames.current_slot().command_buffer();
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipelines.texture);
        self.bind_quad(cmd);
        let sets = [
            self.frame_sets[self.frames.current_index()].set(),
            texture.descriptor_set(),
        ];
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipelines.layout,
            0,
            &sets,
            &[],
        );
        cmd.push_constants(
            self.pipelines.layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            &PushTransform::from_rect(rect),
        );
        cmd.draw_indexed(UNIT_QUAD_INDICES.len() as u32, 1, 0, 0, 0);
    }

    /// Draws a flat-colored line segment from `p0` to `p1`.
    ///
    /// Must be called between `start_frame` and `end_frame`.
    pub fn draw_line(&self, p0: Vec2, p1: Vec2) {
        debug_assert!(self.recording, "draw_line outside a frame bracket");

        let cmd = self.frames.current_slot().command_buffer();
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipelines.line);
        cmd.bind_vertex_buffers(0, &[self.line_vertices.handle()], &[0]);
        self.bind_frame_set(cmd);
        cmd.push_constants(
            self.pipelines.layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            &PushTransform::for_line(p0, p1),
        );
        cmd.draw(UNIT_LINE_VERTICES.len() as u32, 1, 0, 0);
    }

    /// Creates a texture from tightly packed RGBA8 pixel data.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are zero, `pixels` is not exactly
    /// `width * height * 4` bytes, or the GPU upload fails.
    pub fn create_texture(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Texture> {
        if width == 0 || height == 0 {
            return Err(Error::Resource(format!(
                "texture dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        let expected = crate::texture::rgba8_len(width, height);
        if pixels.len() != expected {
            return Err(Error::Resource(format!(
                "expected {} bytes of RGBA8 pixel data for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }

        let texture = Texture::new(
            self.device.clone(),
            &self.upload_pool,
            &mut self.descriptors,
            self.sampler,
            pixels,
            width,
            height,
        )?;
        Ok(texture)
    }

    /// Destroys a texture, returning its descriptor set to the pool.
    ///
    /// Waits for all in-flight frames first so no queued command still
    /// references the set. Must not be called between `start_frame` and
    /// `end_frame`: the current slot's fence was reset at `start_frame`
    /// and will not signal until the frame is submitted, so the wait would
    /// never return.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails or the set does not belong to
    /// this renderer's pools.
    pub fn destroy_texture(&mut self, mut texture: Texture) -> Result<()> {
        debug_assert!(!self.recording, "destroy_texture inside a frame bracket");
        self.frames.wait_for_all()?;
        if let Some(set) = texture.take_set() {
            self.descriptors.free_image_set(set)?;
        }
        debug!("Destroyed texture");
        Ok(())
    }

    /// Re-arms the frame scheduler after the render target was recreated.
    ///
    /// Waits for all in-flight work and replaces the semaphores, since a
    /// stale acquire can leave one signaled with nothing waiting on it.
    /// Must not be called between `start_frame` and `end_frame`, for the
    /// same reason as [`destroy_texture`](Self::destroy_texture).
    ///
    /// # Errors
    ///
    /// Returns an error if the wait or semaphore recreation fails.
    pub fn handle_target_change(&mut self) -> Result<()> {
        debug_assert!(!self.recording, "handle_target_change inside a frame bracket");
        self.frames.wait_for_all()?;
        self.frames.reset_semaphores()?;
        Ok(())
    }

    /// Returns the current draw color.
    #[inline]
    pub fn draw_color(&self) -> Color {
        self.draw_color
    }

    /// Returns the number of frames in flight.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.frames_in_flight()
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn bind_quad(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.quad_vertices.handle()], &[0]);
        cmd.bind_index_buffer(self.quad_indices.handle(), 0, vk::IndexType::UINT16);
    }

    fn bind_frame_set(&self, cmd: &CommandBuffer) {
        let sets = [self.frame_sets[self.frames.current_index()].set()];
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipelines.layout,
            0,
            &sets,
            &[],
        );
    }

    fn flush_mvp(&mut self) -> RhiResult<()> {
        let bytes = bytemuck::bytes_of(&self.mvp);
        for i in 0..self.mvp_buffers.len() {
            self.mvp_stagings[i].write_data(0, bytes)?;
            upload::upload_to_device(
                &self.upload_pool,
                &self.mvp_stagings[i],
                &self.mvp_buffers[i],
                MVP_SIZE,
            )?;
        }
        Ok(())
    }

    fn flush_color(&mut self) -> RhiResult<()> {
        let bytes = bytemuck::bytes_of(&self.draw_color);
        for i in 0..self.color_buffers.len() {
            self.color_stagings[i].write_data(0, bytes)?;
            upload::upload_to_device(
                &self.upload_pool,
                &self.color_stagings[i],
                &self.color_buffers[i],
                COLOR_SIZE,
            )?;
        }
        Ok(())
    }
}

impl Drop for Renderer2d {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed renderer");
    }
}

/// Creates the shared linear-filtering sampler used by all textures.
fn create_sampler(device: &Device) -> RhiResult<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .min_lod(0.0)
        .max_lod(0.0);

    let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
    Ok(sampler)
}

/// Uploads `bytes` into a new device-local buffer through a staging buffer.
fn upload_static(
    device: Arc<Device>,
    pool: &CommandPool,
    usage: BufferUsage,
    bytes: &[u8],
) -> RhiResult<Buffer> {
    let staging = Buffer::new_staging_with_data(device.clone(), bytes)?;
    let dst = Buffer::new(device, usage, bytes.len() as vk::DeviceSize)?;
    upload::upload_to_device(pool, &staging, &dst, bytes.len() as vk::DeviceSize)?;
    Ok(dst)
}
