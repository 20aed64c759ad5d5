//! Descriptor set layouts, pools and writes.
//!
//! - [`DescriptorSetLayout`] describes the bindings a shader expects
//! - [`DescriptorPool`] hands out sets for one fixed capacity
//! - [`DescriptorWriter`] batches buffer and image writes into one update
//!
//! Sets are never freed individually; they live as long as their pool.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::DeviceHandle;

/// Shorthand constructors for layout bindings with a single descriptor.
pub struct DescriptorBinding;

impl DescriptorBinding {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    fn single(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    layout: DeviceHandle<vk::DescriptorSetLayout>,
    binding_count: usize,
}

impl DescriptorSetLayout {
    pub fn new(
        device: &Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)
        }
        .context("vkCreateDescriptorSetLayout")?;

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            layout: DeviceHandle::new(device.clone(), layout),
            binding_count: bindings.len(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn binding_count(&self) -> usize {
        self.binding_count
    }
}

/// Capacity of a [`DescriptorPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolCapacity {
    pub uniform_buffers: u32,
    pub combined_image_samplers: u32,
    pub max_sets: u32,
}

impl PoolCapacity {
    pub fn pool_sizes(&self) -> [vk::DescriptorPoolSize; 2] {
        [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(self.uniform_buffers),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(self.combined_image_samplers),
        ]
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// Allocation is not internally synchronized; the pool is used from the
/// render thread only.
pub struct DescriptorPool {
    pool: DeviceHandle<vk::DescriptorPool>,
    device: Arc<Device>,
    capacity: PoolCapacity,
}

impl DescriptorPool {
    pub fn new(device: &Arc<Device>, capacity: PoolCapacity) -> RhiResult<Self> {
        let pool_sizes = capacity.pool_sizes();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(capacity.max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None) }
            .context("vkCreateDescriptorPool")?;

        debug!(
            "Created descriptor pool: {} UBO, {} CIS, {} set(s)",
            capacity.uniform_buffers, capacity.combined_image_samplers, capacity.max_sets
        );

        Ok(Self {
            pool: DeviceHandle::new(device.clone(), pool),
            device: device.clone(),
            capacity,
        })
    }

    /// Allocates `count` sets with the same layout.
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool.handle())
            .set_layouts(&layouts);

        unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) }
            .context("vkAllocateDescriptorSets")
    }

    /// Allocates a single set.
    pub fn allocate_one(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        self.allocate(layout, 1)?
            .pop()
            .ok_or_else(|| RhiError::InvalidArgument("descriptor allocation returned no set".into()))
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool.handle()
    }

    #[inline]
    pub fn capacity(&self) -> PoolCapacity {
        self.capacity
    }
}

#[derive(Clone, Copy, Debug)]
enum WriteResource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Clone, Copy, Debug)]
struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    resource: WriteResource,
}

/// Collects descriptor writes and submits them in one update call.
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `range` bytes of `buffer` as a uniform buffer.
    pub fn uniform_buffer(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            resource: WriteResource::Buffer(
                vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(0)
                    .range(range),
            ),
        });
        self
    }

    /// Binds a view and sampler pair that the shader reads in `layout`.
    pub fn combined_image_sampler(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            resource: WriteResource::Image(
                vk::DescriptorImageInfo::default()
                    .sampler(sampler)
                    .image_view(view)
                    .image_layout(layout),
            ),
        });
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Applies all collected writes and clears the batch.
    pub fn submit(&mut self, device: &Device) {
        if self.writes.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(pending.set)
                    .dst_binding(pending.binding)
                    .dst_array_element(0);
                match &pending.resource {
                    WriteResource::Buffer(info) => write
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(std::slice::from_ref(info)),
                    WriteResource::Image(info) => write
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
        debug!("Updated {} descriptor binding(s)", writes.len());
        self.writes.clear();
    }
}
