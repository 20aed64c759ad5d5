//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and the
//! gpu-allocator instance every buffer and image allocates from.

use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::OwnedHandle;
use crate::instance::Instance;
use crate::physical_device::{DEVICE_EXTENSIONS, PhysicalDeviceInfo, QueueFamilyIndices};

/// Vulkan logical device wrapper.
///
/// Every device-level resource holds an `Arc<Device>` as its destroy
/// context, so the device outlives all of them. Field order makes the
/// allocator release its memory blocks before the device is destroyed, and
/// the device before the instance.
pub struct Device {
    allocator: Mutex<Allocator>,
    /// Dispatch table for device-level calls. `_owner` destroys the same handle.
    raw: ash::Device,
    _owner: OwnedHandle<ash::Device, ()>,
    physical: PhysicalDeviceInfo,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    instance: Arc<Instance>,
}

impl Device {
    /// Creates the logical device with one queue per unique family.
    ///
    /// Enables `VK_KHR_swapchain`, the Vulkan 1.3 `dynamicRendering` and
    /// `synchronization2` features, and `samplerAnisotropy`.
    pub fn new(instance: Arc<Instance>, physical: PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = physical.queue_families;
        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();
        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3);

        let raw = unsafe {
            instance
                .handle()
                .create_device(physical.device, &create_info, None)
        }
        .context("vkCreateDevice")?;
        let _owner = OwnedHandle::new((), raw.clone());
        info!("Logical device created on '{}'", physical.device_name());

        let graphics_queue = unsafe { raw.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { raw.get_device_queue(queue_families.present, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: raw.clone(),
            physical_device: physical.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|source| RhiError::Allocation {
            name: "allocator".to_string(),
            source,
        })?;
        debug!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            allocator: Mutex::new(allocator),
            raw,
            _owner,
            physical,
            graphics_queue,
            present_queue,
            instance,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.raw
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    #[inline]
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// May be the same queue as [`Device::graphics_queue`].
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical.queue_families
    }

    /// Allocates device memory through the shared allocator.
    pub fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> RhiResult<Allocation> {
        let mut allocator = self.allocator.lock().map_err(|_| RhiError::LockPoisoned)?;
        allocator
            .allocate(desc)
            .map_err(|source| RhiError::Allocation {
                name: desc.name.to_string(),
                source,
            })
    }

    /// Returns memory to the allocator. Only the ownership layer calls this.
    pub(crate) fn free(&self, allocation: Allocation) -> RhiResult<()> {
        let mut allocator = self.allocator.lock().map_err(|_| RhiError::LockPoisoned)?;
        allocator
            .free(allocation)
            .map_err(|source| RhiError::Allocation {
                name: "free".to_string(),
                source,
            })
    }

    /// Blocks until all queues are idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.raw.device_wait_idle() }.context("vkDeviceWaitIdle")
    }

    /// Blocks until the graphics queue is idle.
    pub fn wait_graphics_idle(&self) -> RhiResult<()> {
        unsafe { self.raw.queue_wait_idle(self.graphics_queue) }.context("vkQueueWaitIdle")
    }

    /// Submits work to the graphics queue.
    pub fn submit_graphics(&self, submits: &[vk::SubmitInfo2<'_>], fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.raw.queue_submit2(self.graphics_queue, submits, fence) }
            .context("vkQueueSubmit2")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            error!("Failed to wait for device idle during drop: {}", e);
        }
        info!("Destroying logical device");
    }
}

// SAFETY: the allocator is only reached through its mutex; queue handles are
// plain values and the dispatch table is immutable.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
        assert_send_sync::<Arc<Device>>();
    }
}
