//! Frame scheduling and synchronization.
//!
//! This module provides the [`FrameManager`] struct, which owns the per-frame
//! command buffers and synchronization primitives and drives the frame loop:
//!
//! - Per-frame command buffers
//! - Synchronization primitives (semaphores and fences)
//! - Swapchain image acquisition and presentation
//! - Round-robin cycling through the in-flight slots
//!
//! # Overview
//!
//! The frame manager implements a "frames in flight" pattern where multiple
//! frames can be processed concurrently:
//!
//! 1. While the GPU renders frame N, the CPU prepares frame N+1
//! 2. Each frame slot has its own set of resources to avoid contention
//! 3. Fences ensure the CPU doesn't overwrite resources still in use
//!
//! A frame is bracketed by [`FrameManager::start_frame`] and
//! [`FrameManager::end_frame`]. A stale swapchain is not an error: both calls
//! report it through their status enums so the caller can recreate the target
//! and retry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blit2d_rhi::device::Device;
//! use blit2d_rhi::command::CommandPool;
//! use blit2d_rhi::target::RenderTarget;
//! use blit2d_renderer::frame_manager::{FrameManager, FrameStatus, PresentStatus};
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     command_pool: &CommandPool,
//! #     target: &RenderTarget,
//! # ) -> Result<(), blit2d_rhi::RhiError> {
//! let mut frame_manager = FrameManager::new(device, command_pool, 2)?;
//!
//! // Main render loop
//! loop {
//!     let image_index = match frame_manager.start_frame(target)? {
//!         FrameStatus::Ready { image_index } => image_index,
//!         FrameStatus::SwapchainStale => {
//!             // Recreate the render target, then retry the frame
//!             break;
//!         }
//!     };
//!
//!     // Record rendering commands...
//!     let cmd = frame_manager.current_slot().command_buffer();
//!     // cmd.begin_render_pass(...);
//!     // cmd.draw(...);
//!     // cmd.end_render_pass();
//!
//!     if frame_manager.end_frame(target)? == PresentStatus::SwapchainStale {
//!         // Recreate the render target before the next frame
//!         break;
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use blit2d_rhi::RhiResult;
use blit2d_rhi::command::{CommandBuffer, CommandPool};
use blit2d_rhi::device::Device;
use blit2d_rhi::sync::{Fence, Semaphore};
use blit2d_rhi::target::RenderTarget;

/// Default timeout for waiting on a frame slot's fence, in nanoseconds.
///
/// One second. A healthy frame completes in milliseconds; exceeding this
/// almost always means the device hung, so the wait surfaces
/// [`RhiError::FenceTimeout`](blit2d_rhi::RhiError::FenceTimeout) instead
/// of blocking forever.
pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Outcome of [`FrameManager::start_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A swapchain image was acquired and the command buffer is recording.
    Ready {
        /// Index of the acquired swapchain image.
        image_index: u32,
    },
    /// The swapchain no longer matches the surface. No image was acquired
    /// and the slot was left untouched; recreate the target and retry.
    SwapchainStale,
}

/// Outcome of [`FrameManager::end_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// The image was queued for presentation.
    Presented,
    /// The work was submitted, but the swapchain is stale or suboptimal.
    /// Recreate the target before the next frame.
    SwapchainStale,
}

/// Round-robin cursor over the frame slots.
///
/// Pure bookkeeping, kept separate from the Vulkan calls so the cycling
/// behavior can be tested on its own.
#[derive(Debug, Clone, Copy)]
struct FrameCursor {
    index: usize,
    count: usize,
}

impl FrameCursor {
    fn new(count: usize) -> Self {
        debug_assert!(count >= 1);
        Self { index: 0, count }
    }

    #[inline]
    fn index(&self) -> usize {
        self.index
    }

    #[inline]
    fn count(&self) -> usize {
        self.count
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % self.count;
    }
}

/// Per-slot rendering data.
///
/// Each frame in flight has its own set of resources to avoid synchronization
/// issues between frames:
/// - A command buffer for recording rendering commands
/// - Semaphores for GPU-GPU synchronization
/// - A fence for CPU-GPU synchronization
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on in_flight_fence (CPU waits for previous use of this slot)
/// 2. Acquire swapchain image (signals image_available_semaphore)
/// 3. Record commands to command_buffer
/// 4. Submit command_buffer:
///    - Wait on image_available_semaphore
///    - Signal render_finished_semaphore
///    - Signal in_flight_fence
/// 5. Present (waits on render_finished_semaphore)
/// ```
pub struct FrameSlot {
    /// Command buffer for recording rendering commands.
    command_buffer: CommandBuffer,
    /// Semaphore signaled when a swapchain image is available.
    image_available_semaphore: Semaphore,
    /// Semaphore signaled when rendering is complete.
    render_finished_semaphore: Semaphore,
    /// Fence used to wait for slot completion before reusing resources.
    in_flight_fence: Fence,
}

impl FrameSlot {
    fn new(device: Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), command_pool)?;
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        // Create fence in signaled state so the first wait doesn't block forever
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    /// Returns a reference to the command buffer.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Returns a reference to the image available semaphore.
    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    /// Returns a reference to the render finished semaphore.
    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    /// Returns a reference to the in-flight fence.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }
}

/// Manages per-frame resources and drives the frame loop.
///
/// The frame manager coordinates the rendering pipeline by:
/// - Managing one [`FrameSlot`] per frame in flight
/// - Handling swapchain image acquisition and presentation
/// - Synchronizing CPU and GPU work
///
/// # Frames in Flight
///
/// The manager maintains a caller-chosen number of slots, typically 2 or 3.
/// This allows the CPU to prepare frame N+1 while the GPU is still rendering
/// frame N.
///
/// # Thread Safety
///
/// The frame manager is not thread-safe. It should only be accessed
/// from a single thread (typically the main/render thread).
pub struct FrameManager {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Per-frame resources.
    slots: Vec<FrameSlot>,
    /// Round-robin position in `slots`.
    cursor: FrameCursor,
    /// Swapchain image index acquired by the current frame.
    image_index: u32,
    /// Timeout for fence waits, in nanoseconds.
    fence_timeout_ns: u64,
}

impl FrameManager {
    /// Creates a new frame manager with `frames_in_flight` slots and the
    /// default fence timeout of [`FENCE_TIMEOUT_NS`].
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use blit2d_rhi::device::Device;
    /// use blit2d_rhi::command::CommandPool;
    /// use blit2d_renderer::frame_manager::FrameManager;
    ///
    /// # fn example(device: Arc<Device>, command_pool: &CommandPool) -> Result<(), blit2d_rhi::RhiError> {
    /// let frame_manager = FrameManager::new(device, command_pool, 2)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        device: Arc<Device>,
        command_pool: &CommandPool,
        frames_in_flight: usize,
    ) -> RhiResult<Self> {
        Self::with_fence_timeout(device, command_pool, frames_in_flight, FENCE_TIMEOUT_NS)
    }

    /// Creates a new frame manager with an explicit fence wait timeout.
    pub fn with_fence_timeout(
        device: Arc<Device>,
        command_pool: &CommandPool,
        frames_in_flight: usize,
        fence_timeout_ns: u64,
    ) -> RhiResult<Self> {
        debug_assert!(frames_in_flight >= 1, "need at least one frame in flight");

        let mut slots = Vec::with_capacity(frames_in_flight);
        for i in 0..frames_in_flight {
            let slot = FrameSlot::new(device.clone(), command_pool)?;
            debug!("Created frame slot {}", i);
            slots.push(slot);
        }

        info!(
            "Frame manager created with {} frames in flight",
            frames_in_flight
        );

        Ok(Self {
            device,
            slots,
            cursor: FrameCursor::new(frames_in_flight),
            image_index: 0,
            fence_timeout_ns,
        })
    }

    /// Returns a reference to the current frame slot.
    ///
    /// This provides access to the command buffer and synchronization
    /// primitives for the slot currently being recorded.
    #[inline]
    pub fn current_slot(&self) -> &FrameSlot {
        &self.slots[self.cursor.index()]
    }

    /// Returns the current slot index (0 to `frames_in_flight - 1`).
    #[inline]
    pub fn current_index(&self) -> usize {
        self.cursor.index()
    }

    /// Returns the swapchain image index acquired by the current frame.
    ///
    /// Set by [`start_frame`](Self::start_frame) when it returns
    /// [`FrameStatus::Ready`].
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Begins a frame on the current slot.
    ///
    /// Waits for the slot's previous submission to complete, acquires the
    /// next swapchain image, then resets the fence and puts the command
    /// buffer into the recording state.
    ///
    /// The fence is only reset after a successful acquire. If the swapchain
    /// is stale the slot is left signaled and untouched, so the caller can
    /// recreate the target and call `start_frame` again on the same slot.
    ///
    /// # Returns
    ///
    /// [`FrameStatus::Ready`] with the acquired image index, or
    /// [`FrameStatus::SwapchainStale`] if the target must be recreated.
    ///
    /// # Errors
    ///
    /// Returns an error if the fence wait times out, the device is lost, or
    /// acquisition fails for a reason other than a stale swapchain.
    pub fn start_frame(&mut self, target: &RenderTarget) -> RhiResult<FrameStatus> {
        let slot = &self.slots[self.cursor.index()];

        slot.in_flight_fence.wait(self.fence_timeout_ns)?;

        let acquired = match target.acquire_next_image(slot.image_available_semaphore.handle()) {
            Ok((index, false)) => index,
            Ok((_, true)) => {
                debug!("Swapchain suboptimal during acquire");
                return Ok(FrameStatus::SwapchainStale);
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                return Ok(FrameStatus::SwapchainStale);
            }
            Err(e) => return Err(e.into()),
        };

        slot.in_flight_fence.reset()?;
        slot.command_buffer.reset()?;
        slot.command_buffer.begin()?;

        self.image_index = acquired;
        Ok(FrameStatus::Ready {
            image_index: acquired,
        })
    }

    /// Ends the current frame: finalizes the command buffer, submits it to
    /// the graphics queue, and queues the acquired image for presentation.
    ///
    /// The submission waits on the image available semaphore at the color
    /// attachment output stage, signals the render finished semaphore, and
    /// signals the in-flight fence. The cursor advances to the next slot
    /// whether or not presentation reported a stale swapchain, since the
    /// submitted work still completes and re-signals the fence.
    ///
    /// # Errors
    ///
    /// Returns an error if ending the command buffer, submission, or
    /// presentation fails for a reason other than a stale swapchain.
    pub fn end_frame(&mut self, target: &RenderTarget) -> RhiResult<PresentStatus> {
        let slot = &self.slots[self.cursor.index()];

        slot.command_buffer.end()?;

        let wait_semaphores = [slot.image_available_semaphore.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished_semaphore.handle()];
        let command_buffers = [slot.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                slot.in_flight_fence.handle(),
            )?;
        }

        let status = match target.present(
            self.device.present_queue(),
            self.image_index,
            slot.render_finished_semaphore.handle(),
        ) {
            Ok(false) => PresentStatus::Presented,
            Ok(true) => {
                debug!("Swapchain suboptimal during present");
                PresentStatus::SwapchainStale
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                PresentStatus::SwapchainStale
            }
            Err(e) => return Err(e.into()),
        };

        self.cursor.advance();
        Ok(status)
    }

    /// Waits for all in-flight frames to complete.
    ///
    /// This is useful before destroying resources or recreating the render
    /// target to ensure all GPU work has finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_for_all(&self) -> RhiResult<()> {
        let fences: Vec<vk::Fence> = self
            .slots
            .iter()
            .map(|s| s.in_flight_fence.handle())
            .collect();

        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, u64::MAX)?;
        }

        Ok(())
    }

    /// Replaces all semaphores to ensure clean state after target recreation.
    ///
    /// A stale acquire can leave an image available semaphore signaled with
    /// no submission ever waiting on it. Recreating the semaphores returns
    /// every slot to a known state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn reset_semaphores(&mut self) -> RhiResult<()> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.image_available_semaphore = Semaphore::new(self.device.clone())?;
            slot.render_finished_semaphore = Semaphore::new(self.device.clone())?;
            debug!("Reset semaphores for frame slot {}", i);
        }

        info!("Reset all frame semaphores");
        Ok(())
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the number of frames in flight.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.cursor.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_cycles_round_robin() {
        let mut cursor = FrameCursor::new(3);
        assert_eq!(cursor.index(), 0);
        cursor.advance();
        assert_eq!(cursor.index(), 1);
        cursor.advance();
        assert_eq!(cursor.index(), 2);
        cursor.advance();
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn test_cursor_single_slot_stays_put() {
        let mut cursor = FrameCursor::new(1);
        for _ in 0..5 {
            cursor.advance();
            assert_eq!(cursor.index(), 0);
        }
    }

    #[test]
    fn test_cursor_returns_to_start_after_full_cycle() {
        for count in 1..=4 {
            let mut cursor = FrameCursor::new(count);
            for _ in 0..count {
                cursor.advance();
            }
            assert_eq!(cursor.index(), 0);
        }
    }

    #[test]
    fn test_frame_status_reports_image_index() {
        let status = FrameStatus::Ready { image_index: 2 };
        assert_eq!(status, FrameStatus::Ready { image_index: 2 });
        assert_ne!(status, FrameStatus::SwapchainStale);
    }

    #[test]
    fn test_frame_manager_is_send() {
        // Compile-time check that FrameManager is Send
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
    }

    #[test]
    fn test_frame_slot_is_send() {
        // Compile-time check that FrameSlot is Send
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlot>();
    }
}
