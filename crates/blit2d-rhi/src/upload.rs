//! Synchronous one-shot upload path.
//!
//! Transfers that are not part of the steady-state frame loop — initial
//! geometry, texture pixels, a changed projection matrix — go through a
//! throwaway command buffer that is recorded, submitted and waited to
//! completion before returning. This is intentionally blocking: these
//! transfers happen at load time or on rare events (texture load, window
//! resize), never per frame, so simplicity wins over overlap.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blit2d_rhi::buffer::{Buffer, BufferUsage};
//! use blit2d_rhi::command::CommandPool;
//! use blit2d_rhi::device::Device;
//! use blit2d_rhi::upload;
//!
//! # fn example(device: Arc<Device>) -> Result<(), blit2d_rhi::RhiError> {
//! let pool = CommandPool::new_transient(device.clone(), device.queue_families().graphics)?;
//!
//! let vertices: [f32; 8] = [-0.5, -0.5, 0.5, -0.5, 0.5, 0.5, -0.5, 0.5];
//! let staging = Buffer::new_staging_with_data(device.clone(), bytemuck::cast_slice(&vertices))?;
//! let vertex_buffer = Buffer::new(device, BufferUsage::Vertex, staging.size())?;
//!
//! upload::upload_to_device(&pool, &staging, &vertex_buffer, staging.size())?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::debug;

use crate::buffer::Buffer;
use crate::command::{CommandBuffer, CommandPool};
use crate::error::{RhiError, RhiResult};

/// Records and runs a one-shot command buffer on the graphics queue.
///
/// Allocates a command buffer from `pool`, records `record` into it,
/// submits, waits for the queue to go idle, and frees the buffer. The
/// queue-idle wait is one of the three blocking points in the design
/// (fence wait, upload wait, shutdown wait); ordering against in-flight
/// frames is guaranteed because the wait covers the whole queue.
///
/// # Errors
///
/// Returns an error if recording, submission or the idle wait fails.
pub fn execute_one_shot<F>(pool: &CommandPool, record: F) -> RhiResult<()>
where
    F: FnOnce(&CommandBuffer),
{
    let device = pool.device();
    let cmd = CommandBuffer::new(device.clone(), pool)?;

    cmd.begin()?;
    record(&cmd);
    cmd.end()?;

    let command_buffers = [cmd.handle()];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    let result = unsafe {
        device
            .handle()
            .queue_submit(device.graphics_queue(), &[submit_info], vk::Fence::null())
            .and_then(|_| device.handle().queue_wait_idle(device.graphics_queue()))
    };

    pool.free_command_buffer(cmd.handle());

    result.map_err(|e| match e {
        vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
        other => RhiError::Vulkan(other),
    })?;

    Ok(())
}

/// Copies `size` bytes from a staging buffer into a device-local buffer.
///
/// # Errors
///
/// Returns an error if `size` exceeds either buffer, or if the one-shot
/// submission fails.
pub fn upload_to_device(
    pool: &CommandPool,
    src: &Buffer,
    dst: &Buffer,
    size: vk::DeviceSize,
) -> RhiResult<()> {
    if size > src.size() || size > dst.size() {
        return Err(RhiError::InvalidHandle(format!(
            "upload of {} bytes exceeds buffer sizes (src {}, dst {})",
            size,
            src.size(),
            dst.size()
        )));
    }

    execute_one_shot(pool, |cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        cmd.copy_buffer(src.handle(), dst.handle(), &[region]);
    })?;

    debug!("Uploaded {} bytes to device-local buffer", size);

    Ok(())
}
