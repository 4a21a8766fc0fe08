//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Everything here is fatal from the renderer's point of view: there is no
/// internal retry for lost devices, failed object creation or exhausted
/// fixed-size pools. Caller-actionable swapchain staleness is deliberately
/// *not* an error; it is reported through the frame status instead.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] ash::vk::Result),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// The device stopped responding
    #[error("device lost")]
    DeviceLost,

    /// A fence wait exceeded its timeout; treated as device loss
    #[error("fence wait timed out")]
    FenceTimeout,

    /// A fixed-capacity descriptor pool cannot satisfy the request
    #[error("descriptor pool exhausted: requested {requested}, {remaining} remaining")]
    PoolExhausted { requested: u32, remaining: u32 },

    /// Invalid handle or argument error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausted_display() {
        let err = RhiError::PoolExhausted {
            requested: 3,
            remaining: 2,
        };
        assert_eq!(
            err.to_string(),
            "descriptor pool exhausted: requested 3, 2 remaining"
        );
    }

    #[test]
    fn test_vulkan_error_conversion() {
        let err = RhiError::from(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(matches!(err, RhiError::Vulkan(_)));
    }
}
