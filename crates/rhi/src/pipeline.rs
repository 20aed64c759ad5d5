//! Graphics pipelines and pipeline layouts.
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout (set layouts + push constants)
//! - [`Pipeline`] wraps a graphics VkPipeline
//! - [`GraphicsPipelineBuilder`] configures the fixed-function state used
//!   by the renderer's passes, targeting dynamic rendering
//!
//! Every pipeline has dynamic viewport and scissor. Layouts do not depend
//! on attachment formats, so they survive swapchain recreation while
//! pipelines may be rebuilt.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::DeviceHandle;
use crate::shader::Shader;
use crate::vertex::VertexLayout;

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    layout: DeviceHandle<vk::PipelineLayout>,
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None) }
            .context("vkCreatePipelineLayout")?;

        debug!(
            "Created pipeline layout with {} set layout(s) and {} push constant range(s)",
            set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self {
            layout: DeviceHandle::new(device.clone(), layout),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    pipeline: DeviceHandle<vk::Pipeline>,
    name: &'static str,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Colour blending for the single colour attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Source replaces destination.
    #[default]
    Opaque,
    /// `dst + src` on every channel; used to accumulate counts.
    Additive,
}

impl BlendMode {
    pub fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            BlendMode::Opaque => state.blend_enable(false),
            BlendMode::Additive => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Depth test configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare_op: vk::CompareOp,
}

impl DepthState {
    /// Test and write with `LESS_OR_EQUAL`.
    pub const READ_WRITE: Self = Self {
        test: true,
        write: true,
        compare_op: vk::CompareOp::LESS_OR_EQUAL,
    };

    pub const DISABLED: Self = Self {
        test: false,
        write: false,
        compare_op: vk::CompareOp::ALWAYS,
    };

    /// Strict `LESS`; fragments at equal depth are rejected.
    pub const READ_WRITE_STRICT: Self = Self {
        test: true,
        write: true,
        compare_op: vk::CompareOp::LESS,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        Self::READ_WRITE
    }
}

/// Builder for graphics pipelines.
///
/// Defaults: triangle list, fill, back-face culling, counter-clockwise
/// front face, depth test and write with `LESS_OR_EQUAL`, opaque blending,
/// dynamic viewport and scissor. Depth state is ignored unless a depth
/// format is set. A pipeline without a colour format renders depth only.
pub struct GraphicsPipelineBuilder<'a> {
    name: &'static str,
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_layout: VertexLayout,
    cull_mode: CullMode,
    depth: DepthState,
    blend: BlendMode,
    color_format: Option<vk::Format>,
    depth_format: Option<vk::Format>,
    dynamic_depth_bias: bool,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            vertex_shader: None,
            fragment_shader: None,
            vertex_layout: VertexLayout::MESH,
            cull_mode: CullMode::Back,
            depth: DepthState::READ_WRITE,
            blend: BlendMode::Opaque,
            color_format: None,
            depth_format: None,
            dynamic_depth_bias: false,
        }
    }

    pub fn shaders(mut self, vertex: &'a Shader, fragment: &'a Shader) -> Self {
        self.vertex_shader = Some(vertex);
        self.fragment_shader = Some(fragment);
        self
    }

    pub fn vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn color_format(mut self, format: vk::Format) -> Self {
        self.color_format = Some(format);
        self
    }

    pub fn depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Enables depth bias, with factors supplied at record time.
    pub fn dynamic_depth_bias(mut self) -> Self {
        self.dynamic_depth_bias = true;
        self
    }

    fn dynamic_states(&self) -> Vec<vk::DynamicState> {
        let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        if self.dynamic_depth_bias {
            states.push(vk::DynamicState::DEPTH_BIAS);
        }
        states
    }

    fn effective_depth(&self) -> DepthState {
        if self.depth_format.is_some() {
            self.depth
        } else {
            DepthState::DISABLED
        }
    }

    pub fn build(self, device: &Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let (vertex_shader, fragment_shader) = self
            .vertex_shader
            .zip(self.fragment_shader)
            .ok_or_else(|| {
                RhiError::InvalidArgument(format!("pipeline '{}' has no shaders", self.name))
            })?;

        let stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let bindings = self.vertex_layout.binding_descriptions();
        let attributes = self.vertex_layout.attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(self.dynamic_depth_bias);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth = self.effective_depth();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth.test)
            .depth_write_enable(depth.write)
            .depth_compare_op(depth.compare_op)
            .max_depth_bounds(1.0);

        let blend_attachments: Vec<_> = self
            .color_format
            .iter()
            .map(|_| self.blend.attachment_state())
            .collect();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = self.dynamic_states();
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = self.color_format.into_iter().collect();
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_format.unwrap_or(vk::Format::UNDEFINED));

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device.handle().create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&create_info),
                None,
            )
        }
        .map_err(|(_, result)| RhiError::Vk {
            call: "vkCreateGraphicsPipelines",
            result,
        })?;
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::InvalidArgument(format!("pipeline '{}' was not created", self.name))
        })?;

        debug!(
            "Created pipeline '{}' (colour {:?}, depth {:?})",
            self.name, self.color_format, self.depth_format
        );

        Ok(Pipeline {
            pipeline: DeviceHandle::new(device.clone(), pipeline),
            name: self.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_additive_blend_is_one_one() {
        let state = BlendMode::Additive.attachment_state();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_opaque_blend_disabled() {
        let state = BlendMode::Opaque.attachment_state();
        assert_eq!(state.blend_enable, vk::FALSE);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new("test");
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.depth, DepthState::READ_WRITE);
        assert_eq!(builder.blend, BlendMode::Opaque);
        assert_eq!(builder.vertex_layout, VertexLayout::MESH);
        assert_eq!(
            builder.dynamic_states(),
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_dynamic_depth_bias_state() {
        let builder = GraphicsPipelineBuilder::new("shadow").dynamic_depth_bias();
        assert!(builder.dynamic_states().contains(&vk::DynamicState::DEPTH_BIAS));
    }

    #[test]
    fn test_depth_ignored_without_depth_format() {
        let builder = GraphicsPipelineBuilder::new("post").depth(DepthState::READ_WRITE);
        assert_eq!(builder.effective_depth(), DepthState::DISABLED);

        let builder = builder.depth_format(vk::Format::D32_SFLOAT);
        assert_eq!(builder.effective_depth(), DepthState::READ_WRITE);
    }
}
