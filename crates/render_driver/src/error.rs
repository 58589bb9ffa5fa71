//! Driver error types

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use crate::vulkan::barrier::TextureLayout;

/// Errors surfaced by the render driver
#[derive(Error, Debug)]
pub enum DriverError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Bring-up failed; the driver is unusable
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// A buffer, image, view, shader module, pipeline or command buffer could not be created
    #[error("Failed to allocate {what}: {result:?}")]
    Allocation {
        /// Kind of object that was being created
        what: &'static str,
        /// Result code reported by the API or the allocator
        result: vk::Result,
    },

    /// Layout transition outside the supported table
    #[error("Unsupported layout transition: {from:?} -> {to:?}")]
    UnsupportedTransition {
        /// Layout the texture is currently tracked in
        from: TextureLayout,
        /// Layout that was requested
        to: TextureLayout,
    },

    /// Fence wait, queue submit, image acquisition or present failed
    #[error("Submission failed: {0:?}")]
    Submission(vk::Result),

    /// Handle was destroyed or never belonged to this driver
    #[error("Invalid {kind} handle")]
    InvalidHandle {
        /// Resource kind the handle refers to
        kind: &'static str,
    },

    /// Buffer memory is not visible to the host
    #[error("Buffer of {size} bytes is device-local and cannot be accessed from the host")]
    HostAccess {
        /// Size of the buffer in bytes
        size: vk::DeviceSize,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Compiled shader bytecode could not be read
    #[error("Failed to load shader {path:?}: {source}")]
    ShaderLoad {
        /// File that was requested
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Wrap an allocation failure for the named object kind
    pub(crate) fn allocation(what: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::Allocation { what, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_error_names_the_object() {
        let err = DriverError::allocation("buffer")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let message = err.to_string();
        assert!(message.contains("buffer"));
        assert!(message.contains("ERROR_OUT_OF_DEVICE_MEMORY"));
    }

    #[test]
    fn test_unsupported_transition_message() {
        let err = DriverError::UnsupportedTransition {
            from: TextureLayout::ShaderReadOnly,
            to: TextureLayout::TransferDst,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported layout transition: ShaderReadOnly -> TransferDst"
        );
    }
}
