//! GPU buffer management.
//!
//! This module handles vertex, index, uniform, and staging buffers.
//! Memory comes from the device's gpu-allocator; the buffer and its
//! allocation are each held by an [`OwnedHandle`](crate::handle::OwnedHandle)
//! so the buffer is destroyed before its memory is returned.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::DeviceHandle;

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which affects
/// Vulkan usage flags and memory allocation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex stream, filled from a staging buffer
    Vertex,
    /// Device-local index data, filled from a staging buffer
    Index,
    /// Device-local uniform buffer updated from a command buffer
    Uniform,
    /// Host-visible uniform buffer written through its mapping
    HostUniform,
    /// Host-visible upload source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => {
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::HostUniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index | BufferUsage::Uniform => {
                MemoryLocation::GpuOnly
            }
            BufferUsage::HostUniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::HostUniform => "host uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// A buffer together with the memory bound to it.
pub struct GpuBuffer {
    buffer: DeviceHandle<vk::Buffer>,
    allocation: DeviceHandle<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl GpuBuffer {
    /// Creates a new buffer with the specified size.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or buffer/memory allocation fails.
    pub fn new(device: &Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "{} buffer size must be greater than 0",
                usage.name()
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None) }
            .context("vkCreateBuffer")?;
        let buffer = DeviceHandle::new(device.clone(), buffer);

        let requirements =
            unsafe { device.handle().get_buffer_memory_requirements(buffer.handle()) };
        let allocation = device.allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        let allocation = DeviceHandle::new(device.clone(), allocation);

        if let Some(memory) = allocation.get() {
            unsafe {
                device
                    .handle()
                    .bind_buffer_memory(buffer.handle(), memory.memory(), memory.offset())
            }
            .context("vkBindBufferMemory")?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            buffer,
            allocation,
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer and copies `data` into it.
    pub fn new_with_data(device: &Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes data through the persistent mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is not host-visible or the write
    /// would exceed the buffer size.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidArgument(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .get()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| {
                RhiError::InvalidArgument(format!("{} buffer is not mapped", self.usage.name()))
            })?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Writes one plain-data value at offset 0.
    pub fn write_pod<T: Pod>(&self, value: &T) -> RhiResult<()> {
        self.write_data(0, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            !BufferUsage::HostUniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_buffer_usage_memory_location() {
        assert_eq!(BufferUsage::Vertex.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::Index.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::Uniform.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(
            BufferUsage::HostUniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(BufferUsage::Staging.memory_location(), MemoryLocation::CpuToGpu);
    }
}
