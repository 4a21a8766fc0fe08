//! Presentation target: swapchain image acquisition and presentation.
//!
//! Swapchain *creation* (surface formats, present modes, image views,
//! framebuffers) belongs to the application's bring-up code; the frame
//! scheduler only needs to acquire images, look up the framebuffer to
//! render into, and present. [`RenderTarget`] packages exactly that,
//! constructed from the application's objects via
//! [`RenderTarget::from_parts`].
//!
//! Acquire and present surface `vk::Result` directly so the frame
//! scheduler can distinguish a stale swapchain (caller recreates) from a
//! fatal error.

use ash::vk;

/// Borrowed view of an application-owned swapchain and its framebuffers.
///
/// The target does not own any of its handles; the application destroys
/// them after [`crate::device::Device::wait_idle`] at recreation or
/// shutdown. One framebuffer per swapchain image, indexed by the value
/// returned from [`acquire_next_image`].
///
/// [`acquire_next_image`]: RenderTarget::acquire_next_image
pub struct RenderTarget {
    /// Swapchain extension loader.
    loader: ash::khr::swapchain::Device,
    /// Swapchain handle.
    swapchain: vk::SwapchainKHR,
    /// Current surface extent.
    extent: vk::Extent2D,
    /// Render pass the framebuffers were created for.
    render_pass: vk::RenderPass,
    /// One framebuffer per swapchain image.
    framebuffers: Vec<vk::Framebuffer>,
}

impl RenderTarget {
    /// Wraps an existing swapchain and its framebuffers.
    pub fn from_parts(
        loader: ash::khr::swapchain::Device,
        swapchain: vk::SwapchainKHR,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        framebuffers: Vec<vk::Framebuffer>,
    ) -> Self {
        Self {
            loader,
            swapchain,
            extent,
            render_pass,
            framebuffers,
        }
    }

    /// Acquires the next presentable image.
    ///
    /// `semaphore` is signaled once the image is actually ready to be
    /// rendered to; the frame's submission must wait on it at
    /// color-attachment-output.
    ///
    /// # Returns
    ///
    /// The image index and a suboptimal flag. `ERROR_OUT_OF_DATE_KHR` is
    /// returned as the error value for the caller to map to a
    /// recreate-swapchain condition.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents an acquired image, waiting on `wait_semaphore`.
    ///
    /// # Returns
    ///
    /// `true` if the swapchain is suboptimal; `ERROR_OUT_OF_DATE_KHR` as
    /// the error value when it must be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    /// Returns the current surface extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the render pass the framebuffers belong to.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the framebuffer for a swapchain image index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; acquire never returns an index
    /// outside the framebuffer list the target was built with.
    #[inline]
    pub fn framebuffer(&self, index: u32) -> vk::Framebuffer {
        self.framebuffers[index as usize]
    }

    /// Number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.framebuffers.len()
    }
}
