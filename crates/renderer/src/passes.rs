//! Per-frame command recording.
//!
//! One frame is recorded into one command buffer, in this order:
//!
//! ```text
//! 1. uniform upload   scene UBO: shader-read -> transfer-write -> shader-read
//! 2. shadow pass      shadow map: undefined -> depth attachment -> depth read-only
//! 3. main pass        colour target: undefined -> colour attachment
//!                     depth buffer: undefined -> depth attachment
//! 4. resolve pass     colour target -> shader read
//!                     swapchain image: undefined -> colour attachment -> present
//! ```
//!
//! Recording is generic over [`CommandEncoder`] and reads only plain
//! handles from a [`FrameRecording`], so it can run without a device.

use ash::vk;
use glam::Mat4;

use lumen_rhi::command::CommandEncoder;
use lumen_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use lumen_rhi::sync::{BufferBarrier, ImageBarrier};

use crate::pipelines::{
    ClearKind, ColorTarget, MaterialSource, ModeEntry, PUSH_CONSTANT_STAGES, PipelineId,
    RenderMode,
};
use crate::uniforms::SceneUniform;

/// An image and the view attachments and samplers use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// Depth bias applied in the shadow pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    pub constant: f32,
    pub clamp: f32,
    pub slope: f32,
}

/// One instance, resolved to the buffers and sets it draws with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub transform: Mat4,
    pub positions: vk::Buffer,
    pub tex_coords: vk::Buffer,
    pub normals: vk::Buffer,
    pub indices: vk::Buffer,
    pub index_count: u32,
    /// Index into the material set arrays (already range-checked).
    pub material_set: usize,
    pub alpha_masked: bool,
}

/// Everything needed to record one frame.
pub struct FrameRecording<'a> {
    pub uniform: &'a SceneUniform,
    pub scene_buffer: vk::Buffer,
    pub scene_set: vk::DescriptorSet,
    pub scene_layout: vk::PipelineLayout,
    pub post_layout: vk::PipelineLayout,
    /// Indexed by [`PipelineId::index`].
    pub pipelines: &'a [vk::Pipeline; PipelineId::COUNT],
    pub standard_materials: &'a [vk::DescriptorSet],
    pub debug_materials: &'a [vk::DescriptorSet],
    pub draws: &'a [DrawItem],

    pub shadow: ImageTarget,
    pub shadow_extent: vk::Extent2D,
    pub depth_bias: DepthBias,

    pub extent: vk::Extent2D,
    pub hdr: ImageTarget,
    pub visualization: ImageTarget,
    pub depth: ImageTarget,
    pub clear_color: [f32; 4],
    pub debug_clear_color: [f32; 4],

    /// This slot's resolve sets.
    pub post_set: vk::DescriptorSet,
    pub vis_set: vk::DescriptorSet,
    pub swapchain: ImageTarget,
}

impl FrameRecording<'_> {
    pub fn mode(&self) -> RenderMode {
        RenderMode::from_uniform(self.uniform.render_mode)
    }

    #[inline]
    fn pipeline(&self, id: PipelineId) -> vk::Pipeline {
        self.pipelines[id.index()]
    }

    fn materials(&self, source: MaterialSource) -> &[vk::DescriptorSet] {
        match source {
            MaterialSource::Standard => self.standard_materials,
            MaterialSource::Debug => self.debug_materials,
        }
    }

    fn color_target(&self, target: ColorTarget) -> ImageTarget {
        match target {
            ColorTarget::Hdr => self.hdr,
            ColorTarget::Visualization => self.visualization,
        }
    }

    fn clear(&self, clear: ClearKind) -> [f32; 4] {
        match clear {
            ClearKind::Scene => self.clear_color,
            ClearKind::Debug => self.debug_clear_color,
        }
    }

    fn resolve_set(&self, resolve: PipelineId) -> vk::DescriptorSet {
        if resolve == PipelineId::VisResolve {
            self.vis_set
        } else {
            self.post_set
        }
    }
}

/// Records all passes of one frame.
pub fn record_frame<E: CommandEncoder>(encoder: &mut E, frame: &FrameRecording<'_>) {
    let entry = frame.mode().entry();
    upload_uniforms(encoder, frame);
    shadow_pass(encoder, frame);
    main_pass(encoder, frame, entry);
    resolve_pass(encoder, frame, entry);
}

fn upload_uniforms<E: CommandEncoder>(encoder: &mut E, frame: &FrameRecording<'_>) {
    encoder.buffer_barriers(&[BufferBarrier::uniform_to_transfer(frame.scene_buffer)]);
    encoder.update_buffer(frame.scene_buffer, 0, bytemuck::bytes_of(frame.uniform));
    encoder.buffer_barriers(&[BufferBarrier::transfer_to_uniform(frame.scene_buffer)]);
}

fn bind_geometry<E: CommandEncoder>(
    encoder: &mut E,
    frame: &FrameRecording<'_>,
    draw: &DrawItem,
    streams: &[vk::Buffer],
) {
    encoder.push_constants(
        frame.scene_layout,
        PUSH_CONSTANT_STAGES,
        bytemuck::bytes_of(&draw.transform),
    );
    encoder.bind_vertex_buffers(streams);
    encoder.bind_index_buffer(draw.indices, vk::IndexType::UINT32);
}

fn shadow_pass<E: CommandEncoder>(encoder: &mut E, frame: &FrameRecording<'_>) {
    encoder.image_barriers(&[ImageBarrier::depth(
        frame.shadow.image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    )]);

    encoder.begin_rendering(
        &RenderingConfig::from_extent(frame.shadow_extent)
            .with_depth_attachment(DepthAttachment::new(frame.shadow.view).store()),
    );
    encoder.bind_pipeline(frame.pipeline(PipelineId::Shadow));
    encoder.set_viewport_scissor(frame.shadow_extent);
    encoder.set_depth_bias(
        frame.depth_bias.constant,
        frame.depth_bias.clamp,
        frame.depth_bias.slope,
    );
    encoder.bind_descriptor_set(frame.scene_layout, 0, frame.scene_set);

    for draw in frame.draws {
        encoder.bind_descriptor_set(
            frame.scene_layout,
            1,
            frame.standard_materials[draw.material_set],
        );
        bind_geometry(encoder, frame, draw, &[draw.positions, draw.tex_coords]);
        encoder.draw_indexed(draw.index_count);
    }
    encoder.end_rendering();

    encoder.image_barriers(&[ImageBarrier::depth(
        frame.shadow.image,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
    )]);
}

fn main_pass<E: CommandEncoder>(
    encoder: &mut E,
    frame: &FrameRecording<'_>,
    entry: &ModeEntry,
) {
    let target = frame.color_target(entry.target);
    encoder.image_barriers(&[
        ImageBarrier::color(
            target.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ),
        ImageBarrier::depth(
            frame.depth.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        ),
    ]);

    encoder.begin_rendering(
        &RenderingConfig::from_extent(frame.extent)
            .with_color_attachment(
                ColorAttachment::new(target.view).with_clear_color(frame.clear(entry.clear)),
            )
            .with_depth_attachment(DepthAttachment::new(frame.depth.view)),
    );

    let mut bound = frame.pipeline(entry.opaque);
    encoder.bind_pipeline(bound);
    encoder.set_viewport_scissor(frame.extent);
    encoder.bind_descriptor_set(frame.scene_layout, 0, frame.scene_set);

    let materials = frame.materials(entry.materials);
    for draw in frame.draws {
        let id = if draw.alpha_masked {
            entry.alpha
        } else {
            entry.opaque
        };
        let pipeline = frame.pipeline(id);
        if pipeline != bound {
            encoder.bind_pipeline(pipeline);
            bound = pipeline;
        }

        encoder.bind_descriptor_set(frame.scene_layout, 1, materials[draw.material_set]);
        bind_geometry(
            encoder,
            frame,
            draw,
            &[draw.positions, draw.tex_coords, draw.normals],
        );
        encoder.draw_indexed(draw.index_count);
    }
    encoder.end_rendering();
}

fn resolve_pass<E: CommandEncoder>(
    encoder: &mut E,
    frame: &FrameRecording<'_>,
    entry: &ModeEntry,
) {
    let source = frame.color_target(entry.target);
    encoder.image_barriers(&[
        ImageBarrier::color(
            source.image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        ImageBarrier::color(
            frame.swapchain.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ),
    ]);

    encoder.begin_rendering(
        &RenderingConfig::from_extent(frame.extent)
            .with_color_attachment(ColorAttachment::new(frame.swapchain.view).overwritten()),
    );
    encoder.bind_pipeline(frame.pipeline(entry.resolve));
    encoder.set_viewport_scissor(frame.extent);
    encoder.bind_descriptor_set(frame.post_layout, 0, frame.resolve_set(entry.resolve));
    // Full-screen triangle generated in the vertex shader.
    encoder.draw(3);
    encoder.end_rendering();

    encoder.image_barriers(&[ImageBarrier::color(
        frame.swapchain.image,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    )]);
}
