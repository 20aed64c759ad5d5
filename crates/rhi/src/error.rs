//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A native call returned an unexpected result code.
    #[error("{call}() returned {result:?}")]
    Vk {
        call: &'static str,
        result: vk::Result,
    },

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Failed to allocate memory for '{name}': {source}")]
    Allocation {
        name: String,
        #[source]
        source: gpu_allocator::AllocationError,
    },

    /// No GPU passed device selection
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A required instance or device extension is unavailable
    #[error("Missing required extension: {0}")]
    MissingExtension(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    Shader(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    Swapchain(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("GPU allocator lock poisoned")]
    LockPoisoned,

    /// Caller passed an argument the native API would reject
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

/// Attaches the name of the failing native call to a raw `vk::Result`.
pub trait VkResultExt<T> {
    fn context(self, call: &'static str) -> RhiResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[inline]
    fn context(self, call: &'static str) -> RhiResult<T> {
        self.map_err(|result| RhiError::Vk { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_names_failing_call() {
        let raw: Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = raw.context("vkCreateImageView").unwrap_err();
        assert_eq!(
            err.to_string(),
            "vkCreateImageView() returned ERROR_OUT_OF_DEVICE_MEMORY"
        );
    }

    #[test]
    fn test_context_passes_success_through() {
        let raw: Result<u32, vk::Result> = Ok(7);
        assert_eq!(raw.context("vkCreateFence").unwrap(), 7);
    }
}
