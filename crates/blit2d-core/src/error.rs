//! Error types for the rendering layer.

use thiserror::Error;

/// Main error type surfaced to applications.
///
/// Fatal GPU conditions (device loss, fence timeout, object creation
/// failure) arrive here through the [`blit2d_rhi::RhiError`] conversion and
/// should terminate the rendering session; none of them are retried
/// internally.
#[derive(Error, Debug)]
pub enum Error {
    /// GPU-level errors bubbled up from the RHI layer
    #[error("RHI error: {0}")]
    Rhi(#[from] blit2d_rhi::RhiError),

    /// Resource creation or upload errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the rendering layer's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rhi_error_display() {
        let err = Error::from(blit2d_rhi::RhiError::FenceTimeout);
        assert!(err.to_string().contains("fence wait timed out"));
    }

    #[test]
    fn test_resource_error_display() {
        let err = Error::Resource("pixel data too short".to_string());
        assert_eq!(err.to_string(), "Resource error: pixel data too short");
    }
}
