//! SPIR-V loading and shader module creation.
//!
//! Shader binaries are treated as opaque blobs. Beyond word alignment and
//! the SPIR-V magic number (checked by [`ash::util::read_spv`]) validation is
//! left to the driver.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::DeviceHandle;

/// Entry point used by every shader in the renderer.
pub const ENTRY_POINT: &CStr = c"main";

/// Pipeline stage a shader module is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decodes a SPIR-V binary into code words.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::Shader(format!("invalid SPIR-V: {}", e)))
}

/// Vulkan shader module wrapper.
pub struct Shader {
    module: DeviceHandle<vk::ShaderModule>,
    stage: ShaderStage,
}

impl Shader {
    /// Loads a SPIR-V file.
    pub fn from_spirv_file(device: &Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path)
            .map_err(|e| RhiError::Shader(format!("failed to read {:?}: {}", path, e)))?;
        let code = decode_spirv(&bytes)
            .map_err(|e| RhiError::Shader(format!("{:?}: {}", path, e)))?;
        Self::from_words(device, &code, stage)
    }

    fn from_words(device: &Arc<Device>, code: &[u32], stage: ShaderStage) -> RhiResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None) }
            .context("vkCreateShaderModule")?;

        Ok(Self {
            module: DeviceHandle::new(device.clone(), module),
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module.handle()
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for pipeline creation; borrows nothing from `self`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.handle())
            .name(ENTRY_POINT)
    }
}
