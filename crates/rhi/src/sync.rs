//! Synchronization primitives.
//!
//! Semaphores order GPU work (acquire → render → present); fences let the
//! host wait for a submission to complete before reusing its resources.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::{RhiResult, VkResultExt};
use crate::handle::DeviceHandle;

/// Binary semaphore for GPU-to-GPU synchronization.
pub struct Semaphore {
    semaphore: DeviceHandle<vk::Semaphore>,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None) }
            .context("vkCreateSemaphore")?;
        Ok(Self {
            semaphore: DeviceHandle::new(device.clone(), semaphore),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore.handle()
    }
}

/// Fence for GPU-to-CPU synchronization.
pub struct Fence {
    fence: DeviceHandle<vk::Fence>,
    device: Arc<Device>,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait
    /// returns immediately.
    pub fn new(device: &Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None) }
            .context("vkCreateFence")?;

        Ok(Self {
            fence: DeviceHandle::new(device.clone(), fence),
            device: device.clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence.handle()
    }

    /// Blocks until the fence is signaled. There is no timeout: a fence that
    /// never signals means the device is lost, which surfaces as an error.
    pub fn wait(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.handle()], true, u64::MAX)
        }
        .context("vkWaitForFences")
    }

    /// Returns the fence to the unsignaled state.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.handle()]) }.context("vkResetFences")
    }
}

/// Pipeline stage and access masks a layout implies for its users.
pub fn layout_scope(layout: vk::ImageLayout) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match layout {
        vk::ImageLayout::UNDEFINED => (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL | vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => {
            (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE)
        }
        _ => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
    }
}

/// Layout transition of (a mip range of) one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub base_mip_level: u32,
    pub level_count: u32,
}

impl ImageBarrier {
    pub fn color(image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        Self::new(image, vk::ImageAspectFlags::COLOR, old_layout, new_layout)
    }

    pub fn depth(image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        Self::new(image, vk::ImageAspectFlags::DEPTH, old_layout, new_layout)
    }

    pub fn new(
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Self {
        Self {
            image,
            aspect,
            old_layout,
            new_layout,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
        }
    }

    /// Restricts the barrier to `count` levels starting at `base`.
    pub fn mip_range(mut self, base: u32, count: u32) -> Self {
        self.base_mip_level = base;
        self.level_count = count;
        self
    }

    /// Source and destination scopes derived from the two layouts.
    ///
    /// Leaving `UNDEFINED` waits on the stage that will next use the image,
    /// so a transition of a freshly acquired swapchain image chains with the
    /// acquire semaphore wait at colour-attachment output.
    pub fn scopes(
        &self,
    ) -> (
        (vk::PipelineStageFlags2, vk::AccessFlags2),
        (vk::PipelineStageFlags2, vk::AccessFlags2),
    ) {
        let dst = layout_scope(self.new_layout);
        let src = if self.old_layout == vk::ImageLayout::UNDEFINED {
            let writes = dst.1
                & (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE);
            (dst.0, writes)
        } else {
            layout_scope(self.old_layout)
        };
        (src, dst)
    }

    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        let ((src_stage, src_access), (dst_stage, dst_access)) = self.scopes();
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(self.aspect)
                    .base_mip_level(self.base_mip_level)
                    .level_count(self.level_count)
                    .base_array_layer(0)
                    .layer_count(1),
            )
    }
}

/// Memory dependency on a whole buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl BufferBarrier {
    const UNIFORM_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
        vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
            | vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw(),
    );

    /// Uniform buffer about to be overwritten by a transfer.
    pub fn uniform_to_transfer(buffer: vk::Buffer) -> Self {
        Self {
            buffer,
            src_stage: Self::UNIFORM_STAGES,
            src_access: vk::AccessFlags2::UNIFORM_READ,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_WRITE,
        }
    }

    /// Uniform buffer written by a transfer, about to be read by shaders.
    pub fn transfer_to_uniform(buffer: vk::Buffer) -> Self {
        Self {
            buffer,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: Self::UNIFORM_STAGES,
            dst_access: vk::AccessFlags2::UNIFORM_READ,
        }
    }

    /// Freshly uploaded vertex stream.
    pub fn transfer_to_vertex(buffer: vk::Buffer) -> Self {
        Self {
            buffer,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
            dst_access: vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
        }
    }

    /// Freshly uploaded index data.
    pub fn transfer_to_index(buffer: vk::Buffer) -> Self {
        Self {
            buffer,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::INDEX_INPUT,
            dst_access: vk::AccessFlags2::INDEX_READ,
        }
    }

    pub fn to_vk(&self) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(self.buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }
}
