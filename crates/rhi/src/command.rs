//! Command pool and command buffer management.
//!
//! Frame recording goes through the [`CommandEncoder`] trait so the pass
//! structure can be driven against a real [`CommandBuffer`] or any other
//! implementation that records the calls.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiResult, VkResultExt};
use crate::handle::DeviceHandle;
use crate::rendering::RenderingConfig;
use crate::sync::{BufferBarrier, ImageBarrier};

/// The graphics commands a frame is recorded with.
pub trait CommandEncoder {
    fn image_barriers(&mut self, barriers: &[ImageBarrier]);
    fn buffer_barriers(&mut self, barriers: &[BufferBarrier]);
    /// In-stream buffer update (at most 65536 bytes, 4-byte aligned).
    fn update_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]);
    fn begin_rendering(&mut self, config: &RenderingConfig);
    fn end_rendering(&mut self);
    /// Full-extent viewport and scissor.
    fn set_viewport_scissor(&mut self, extent: vk::Extent2D);
    fn set_depth_bias(&mut self, constant_factor: f32, clamp: f32, slope_factor: f32);
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn bind_descriptor_set(
        &mut self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    );
    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]);
    /// Binds `buffers` to consecutive bindings starting at 0.
    fn bind_vertex_buffers(&mut self, buffers: &[vk::Buffer]);
    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType);
    fn draw(&mut self, vertex_count: u32);
    fn draw_indexed(&mut self, index_count: u32);
}

/// Vulkan command pool wrapper.
///
/// Command buffers allocated from the pool are freed with it.
pub struct CommandPool {
    pool: DeviceHandle<vk::CommandPool>,
    device: Arc<Device>,
    queue_family_index: u32,
}

impl CommandPool {
    /// Pool whose buffers can be reset individually.
    pub fn new(device: &Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::with_flags(
            device,
            queue_family_index,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
    }

    /// Pool for short-lived, one-time command buffers.
    pub fn new_transient(device: &Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::with_flags(
            device,
            queue_family_index,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )
    }

    fn with_flags(
        device: &Arc<Device>,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(flags);
        let pool = unsafe { device.handle().create_command_pool(&create_info, None) }
            .context("vkCreateCommandPool")?;
        debug!(
            "Command pool created for queue family {} ({:?})",
            queue_family_index, flags
        );

        Ok(Self {
            pool: DeviceHandle::new(device.clone(), pool),
            device: device.clone(),
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool.handle()
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info) }
            .context("vkAllocateCommandBuffers")?;
        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer {
                device: self.device.clone(),
                buffer,
            })
            .collect())
    }

    /// Records `record` into a one-time command buffer, submits it to the
    /// graphics queue and waits for it to finish.
    pub fn submit_and_wait<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&mut CommandBuffer) -> RhiResult<()>,
    {
        let mut buffers = self.allocate(1)?;
        let Some(cmd) = buffers.first_mut() else {
            return Ok(());
        };
        cmd.begin(true)?;
        record(cmd)?;
        cmd.end()?;

        let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle())];
        let submit = vk::SubmitInfo2::default().command_buffer_infos(&cmd_infos);
        self.device.submit_graphics(&[submit], vk::Fence::null())?;
        self.device.wait_graphics_idle()
    }
}

/// A primary command buffer. Freed together with its pool.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    pub fn begin(&self, one_time: bool) -> RhiResult<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)
        }
        .context("vkBeginCommandBuffer")
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.device.handle().end_command_buffer(self.buffer) }
            .context("vkEndCommandBuffer")
    }

    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())
        }
        .context("vkResetCommandBuffer")
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, &[region]);
        }
    }

    /// Copies tightly packed pixels into mip level 0 of `image`, which must
    /// be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, image: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Linear blit from mip `level - 1` (TRANSFER_SRC) to mip `level`
    /// (TRANSFER_DST) of the same image.
    pub fn blit_mip(&self, image: vk::Image, level: u32, src_extent: vk::Extent2D) {
        let mip_offset = |extent: vk::Extent2D| vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        };
        let dst_extent = vk::Extent2D {
            width: (src_extent.width / 2).max(1),
            height: (src_extent.height / 2).max(1),
        };
        let layers = |mip_level| {
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(mip_level)
                .base_array_layer(0)
                .layer_count(1)
        };
        let blit = vk::ImageBlit::default()
            .src_subresource(layers(level - 1))
            .src_offsets([vk::Offset3D::default(), mip_offset(src_extent)])
            .dst_subresource(layers(level))
            .dst_offsets([vk::Offset3D::default(), mip_offset(dst_extent)]);
        unsafe {
            self.device.handle().cmd_blit_image(
                self.buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }
    }
}

impl CommandEncoder for CommandBuffer {
    fn image_barriers(&mut self, barriers: &[ImageBarrier]) {
        let barriers: Vec<_> = barriers.iter().map(ImageBarrier::to_vk).collect();
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe {
            self.device
                .handle()
                .cmd_pipeline_barrier2(self.buffer, &dependency);
        }
    }

    fn buffer_barriers(&mut self, barriers: &[BufferBarrier]) {
        let barriers: Vec<_> = barriers.iter().map(BufferBarrier::to_vk).collect();
        let dependency = vk::DependencyInfo::default().buffer_memory_barriers(&barriers);
        unsafe {
            self.device
                .handle()
                .cmd_pipeline_barrier2(self.buffer, &dependency);
        }
    }

    fn update_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        unsafe {
            self.device
                .handle()
                .cmd_update_buffer(self.buffer, buffer, offset, data);
        }
    }

    fn begin_rendering(&mut self, config: &RenderingConfig) {
        let bundle = config.build();
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, &bundle.info());
        }
    }

    fn end_rendering(&mut self) {
        unsafe { self.device.handle().cmd_end_rendering(self.buffer) };
    }

    fn set_viewport_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    fn set_depth_bias(&mut self, constant_factor: f32, clamp: f32, slope_factor: f32) {
        unsafe {
            self.device.handle().cmd_set_depth_bias(
                self.buffer,
                constant_factor,
                clamp,
                slope_factor,
            );
        }
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    fn bind_descriptor_set(
        &mut self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                &[],
            );
        }
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]) {
        unsafe {
            self.device
                .handle()
                .cmd_push_constants(self.buffer, layout, stages, 0, data);
        }
    }

    fn bind_vertex_buffers(&mut self, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, buffers, &offsets);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(self.buffer, buffer, 0, index_type);
        }
    }

    fn draw(&mut self, vertex_count: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw(self.buffer, vertex_count, 1, 0, 0);
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }
}
