//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a thin, safe layer over Vulkan using the `ash` crate.
//! It handles:
//! - Scoped ownership of native handles ([`handle`])
//! - Instance, physical device and logical device creation
//! - Surface and swapchain management
//! - Command buffer recording behind the [`command::CommandEncoder`] trait
//! - Buffers, images, textures, samplers and descriptors
//! - Shader and pipeline creation
//! - Synchronization primitives and barriers

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod handle;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult, VkResultExt};

// Re-export ash types that users might need
pub use ash::vk;
