//! The fixed pipeline set and the render-mode table.
//!
//! Every pipeline the renderer uses is described by a [`PipelineDesc`] in
//! [`PIPELINE_DESCS`]. Per-frame pipeline selection goes through
//! [`RenderMode::entry`], a single lookup table, instead of branching in
//! the recording code.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, info};

use lumen_rhi::RhiResult;
use lumen_rhi::device::Device;
use lumen_rhi::pipeline::{
    BlendMode, CullMode, DepthState, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use lumen_rhi::shader::{Shader, ShaderStage};
use lumen_rhi::vertex::VertexLayout;

use crate::bindings::BindingLayouts;
use crate::targets::{DEPTH_FORMAT, HDR_FORMAT, SHADOW_FORMAT, VIS_FORMAT};

/// Stages that see the per-draw push constant.
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

/// Size of the per-draw push constant (one world matrix).
pub const PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<Mat4>() as u32;

/// Shading variant for one draw.
///
/// `Alpha` is never selected by the uniform value; it is the
/// material-driven variant of `Standard`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Standard,
    Alpha,
    MipDebug,
    DepthDebug,
    DerivativeDebug,
    Overdraw,
    Overshading,
}

impl RenderMode {
    /// Maps the render-mode integer written to the scene uniform.
    /// Unknown values fall back to `Standard`.
    pub fn from_uniform(value: u32) -> Self {
        match value {
            1 => RenderMode::MipDebug,
            2 => RenderMode::DepthDebug,
            3 => RenderMode::DerivativeDebug,
            4 => RenderMode::Overdraw,
            5 => RenderMode::Overshading,
            _ => RenderMode::Standard,
        }
    }

    pub fn entry(self) -> &'static ModeEntry {
        let index = match self {
            RenderMode::Standard | RenderMode::Alpha => 0,
            RenderMode::MipDebug => 1,
            RenderMode::DepthDebug => 2,
            RenderMode::DerivativeDebug => 3,
            RenderMode::Overdraw => 4,
            RenderMode::Overshading => 5,
        };
        &MODE_TABLE[index]
    }
}

/// Every pipeline the renderer builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineId {
    Standard,
    Alpha,
    MipDebug,
    DepthDebug,
    DerivativeDebug,
    Overdraw,
    Overshading,
    PostProcess,
    VisResolve,
    Shadow,
}

impl PipelineId {
    pub const COUNT: usize = 10;

    pub const ALL: [PipelineId; Self::COUNT] = [
        PipelineId::Standard,
        PipelineId::Alpha,
        PipelineId::MipDebug,
        PipelineId::DepthDebug,
        PipelineId::DerivativeDebug,
        PipelineId::Overdraw,
        PipelineId::Overshading,
        PipelineId::PostProcess,
        PipelineId::VisResolve,
        PipelineId::Shadow,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which material binding-set array a mode draws with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialSource {
    /// Sets built with the anisotropic material sampler.
    Standard,
    /// Sets built with the debug sampler.
    Debug,
}

/// Which off-screen colour target the main pass renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorTarget {
    Hdr,
    Visualization,
}

/// Which clear colour the main pass uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearKind {
    Scene,
    Debug,
}

/// Everything a render mode changes about a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeEntry {
    pub opaque: PipelineId,
    pub alpha: PipelineId,
    pub materials: MaterialSource,
    pub target: ColorTarget,
    /// Resolve pipeline; its per-slot binding set reads `target`.
    pub resolve: PipelineId,
    pub clear: ClearKind,
}

const fn debug_entry(pipeline: PipelineId) -> ModeEntry {
    ModeEntry {
        opaque: pipeline,
        alpha: pipeline,
        materials: MaterialSource::Debug,
        target: ColorTarget::Hdr,
        resolve: PipelineId::PostProcess,
        clear: ClearKind::Scene,
    }
}

const fn visualization_entry(pipeline: PipelineId) -> ModeEntry {
    ModeEntry {
        opaque: pipeline,
        alpha: pipeline,
        materials: MaterialSource::Debug,
        target: ColorTarget::Visualization,
        resolve: PipelineId::VisResolve,
        clear: ClearKind::Debug,
    }
}

static MODE_TABLE: [ModeEntry; 6] = [
    ModeEntry {
        opaque: PipelineId::Standard,
        alpha: PipelineId::Alpha,
        materials: MaterialSource::Standard,
        target: ColorTarget::Hdr,
        resolve: PipelineId::PostProcess,
        clear: ClearKind::Scene,
    },
    debug_entry(PipelineId::MipDebug),
    debug_entry(PipelineId::DepthDebug),
    debug_entry(PipelineId::DerivativeDebug),
    visualization_entry(PipelineId::Overdraw),
    visualization_entry(PipelineId::Overshading),
];

/// Layout a pipeline is built against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutKind {
    /// Set 0 scene, set 1 object, world-matrix push constant.
    Scene,
    /// Set 0 post.
    Post,
}

/// Colour attachment format of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentFormat {
    None,
    Hdr,
    Visualization,
    /// Follows the swapchain; rebuilt when it changes.
    Swapchain,
}

/// Static description of one pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineDesc {
    pub id: PipelineId,
    pub name: &'static str,
    pub vertex_shader: &'static str,
    pub fragment_shader: &'static str,
    pub layout: LayoutKind,
    pub vertex_layout: VertexLayout,
    pub cull: CullMode,
    /// `None` means the pipeline has no depth attachment.
    pub depth: Option<DepthState>,
    pub blend: BlendMode,
    pub color: AttachmentFormat,
    pub depth_bias: bool,
}

impl PipelineDesc {
    const fn scene(
        id: PipelineId,
        name: &'static str,
        vertex_shader: &'static str,
        fragment_shader: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            vertex_shader,
            fragment_shader,
            layout: LayoutKind::Scene,
            vertex_layout: VertexLayout::MESH,
            cull: CullMode::Back,
            depth: Some(DepthState::READ_WRITE),
            blend: BlendMode::Opaque,
            color: AttachmentFormat::Hdr,
            depth_bias: false,
        }
    }

    const fn fullscreen(id: PipelineId, name: &'static str, fragment_shader: &'static str) -> Self {
        Self {
            id,
            name,
            vertex_shader: "fullscreen.vert.spv",
            fragment_shader,
            layout: LayoutKind::Post,
            vertex_layout: VertexLayout::NONE,
            cull: CullMode::None,
            depth: None,
            blend: BlendMode::Opaque,
            color: AttachmentFormat::Swapchain,
            depth_bias: false,
        }
    }

    pub fn color_format(&self, swapchain_format: vk::Format) -> Option<vk::Format> {
        match self.color {
            AttachmentFormat::None => None,
            AttachmentFormat::Hdr => Some(HDR_FORMAT),
            AttachmentFormat::Visualization => Some(VIS_FORMAT),
            AttachmentFormat::Swapchain => Some(swapchain_format),
        }
    }

    pub fn depth_format(&self) -> Option<vk::Format> {
        match (self.depth, self.id) {
            (None, _) => None,
            (Some(_), PipelineId::Shadow) => Some(SHADOW_FORMAT),
            (Some(_), _) => Some(DEPTH_FORMAT),
        }
    }
}

/// All pipelines, indexed by [`PipelineId`].
pub static PIPELINE_DESCS: [PipelineDesc; PipelineId::COUNT] = [
    PipelineDesc::scene(PipelineId::Standard, "standard", "default.vert.spv", "default.frag.spv"),
    PipelineDesc {
        cull: CullMode::None,
        ..PipelineDesc::scene(PipelineId::Alpha, "alpha", "default.vert.spv", "alpha.frag.spv")
    },
    PipelineDesc::scene(PipelineId::MipDebug, "debug mip", "debug.vert.spv", "debug_mip.frag.spv"),
    PipelineDesc::scene(
        PipelineId::DepthDebug,
        "debug depth",
        "debug.vert.spv",
        "debug_depth.frag.spv",
    ),
    PipelineDesc::scene(
        PipelineId::DerivativeDebug,
        "debug derivatives",
        "debug.vert.spv",
        "debug_deriv.frag.spv",
    ),
    // Depth attachment is still present in the main pass, so the format is
    // declared even though testing is off.
    PipelineDesc {
        depth: Some(DepthState::DISABLED),
        blend: BlendMode::Additive,
        color: AttachmentFormat::Visualization,
        ..PipelineDesc::scene(PipelineId::Overdraw, "overdraw", "debug.vert.spv", "overdraw.frag.spv")
    },
    PipelineDesc {
        depth: Some(DepthState::READ_WRITE_STRICT),
        blend: BlendMode::Additive,
        color: AttachmentFormat::Visualization,
        ..PipelineDesc::scene(
            PipelineId::Overshading,
            "overshading",
            "debug.vert.spv",
            "overdraw.frag.spv",
        )
    },
    PipelineDesc::fullscreen(PipelineId::PostProcess, "post process", "fullscreen.frag.spv"),
    PipelineDesc::fullscreen(PipelineId::VisResolve, "vis resolve", "passthrough.frag.spv"),
    PipelineDesc {
        vertex_layout: VertexLayout::SHADOW,
        cull: CullMode::None,
        color: AttachmentFormat::None,
        depth_bias: true,
        ..PipelineDesc::scene(
            PipelineId::Shadow,
            "shadow",
            "shadowmap.vert.spv",
            "shadowmap.frag.spv",
        )
    },
];

/// Pipeline layouts. Stable across swapchain recreation.
pub struct PipelineLayouts {
    scene: PipelineLayout,
    post: PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &Arc<Device>, layouts: &BindingLayouts) -> RhiResult<Self> {
        let push_constant = vk::PushConstantRange::default()
            .stage_flags(PUSH_CONSTANT_STAGES)
            .offset(0)
            .size(PUSH_CONSTANT_SIZE);

        let scene = PipelineLayout::new(
            device,
            &[layouts.scene.handle(), layouts.object.handle()],
            &[push_constant],
        )?;
        let post = PipelineLayout::new(device, &[layouts.post.handle()], &[])?;
        Ok(Self { scene, post })
    }

    #[inline]
    pub fn scene(&self) -> &PipelineLayout {
        &self.scene
    }

    #[inline]
    pub fn post(&self) -> &PipelineLayout {
        &self.post
    }

    fn get(&self, kind: LayoutKind) -> &PipelineLayout {
        match kind {
            LayoutKind::Scene => &self.scene,
            LayoutKind::Post => &self.post,
        }
    }
}

/// Built pipelines, one per [`PipelineId`].
pub struct PipelineSet {
    pipelines: Vec<Pipeline>,
}

impl PipelineSet {
    /// Builds every pipeline from the shaders in `shader_dir`.
    pub fn new(
        device: &Arc<Device>,
        shader_dir: &Path,
        layouts: &PipelineLayouts,
        swapchain_format: vk::Format,
    ) -> RhiResult<Self> {
        let pipelines = PIPELINE_DESCS
            .iter()
            .map(|desc| build_pipeline(device, shader_dir, layouts, desc, swapchain_format))
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Created {} pipelines", pipelines.len());
        Ok(Self { pipelines })
    }

    /// Rebuilds only the pipelines that render to the swapchain.
    ///
    /// Returns the ids that were rebuilt.
    pub fn rebuild_for_format(
        &mut self,
        device: &Arc<Device>,
        shader_dir: &Path,
        layouts: &PipelineLayouts,
        swapchain_format: vk::Format,
    ) -> RhiResult<Vec<PipelineId>> {
        let mut rebuilt = Vec::new();
        for desc in swapchain_dependent() {
            let pipeline = build_pipeline(device, shader_dir, layouts, desc, swapchain_format)?;
            self.pipelines[desc.id.index()] = pipeline;
            rebuilt.push(desc.id);
        }
        debug!("Rebuilt {} pipeline(s) for {:?}", rebuilt.len(), swapchain_format);
        Ok(rebuilt)
    }

    #[inline]
    pub fn get(&self, id: PipelineId) -> &Pipeline {
        &self.pipelines[id.index()]
    }

    /// Raw handles indexed by [`PipelineId::index`].
    pub fn handles(&self) -> [vk::Pipeline; PipelineId::COUNT] {
        PipelineId::ALL.map(|id| self.get(id).handle())
    }
}

/// Descriptions of the pipelines whose colour format follows the swapchain.
pub fn swapchain_dependent() -> impl Iterator<Item = &'static PipelineDesc> {
    PIPELINE_DESCS
        .iter()
        .filter(|desc| desc.color == AttachmentFormat::Swapchain)
}

fn build_pipeline(
    device: &Arc<Device>,
    shader_dir: &Path,
    layouts: &PipelineLayouts,
    desc: &PipelineDesc,
    swapchain_format: vk::Format,
) -> RhiResult<Pipeline> {
    let vertex = Shader::from_spirv_file(
        device,
        &shader_dir.join(desc.vertex_shader),
        ShaderStage::Vertex,
    )?;
    let fragment = Shader::from_spirv_file(
        device,
        &shader_dir.join(desc.fragment_shader),
        ShaderStage::Fragment,
    )?;

    let mut builder = GraphicsPipelineBuilder::new(desc.name)
        .shaders(&vertex, &fragment)
        .vertex_layout(desc.vertex_layout)
        .cull_mode(desc.cull)
        .blend(desc.blend);

    if let Some(format) = desc.color_format(swapchain_format) {
        builder = builder.color_format(format);
    }
    if let (Some(depth), Some(format)) = (desc.depth, desc.depth_format()) {
        builder = builder.depth(depth).depth_format(format);
    }
    if desc.depth_bias {
        builder = builder.dynamic_depth_bias();
    }

    builder.build(device, layouts.get(desc.layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descs_are_indexed_by_id() {
        for (i, desc) in PIPELINE_DESCS.iter().enumerate() {
            assert_eq!(desc.id.index(), i, "{}", desc.name);
            assert_eq!(PipelineId::ALL[i], desc.id);
        }
    }

    #[test]
    fn test_uniform_mapping() {
        assert_eq!(RenderMode::from_uniform(0), RenderMode::Standard);
        assert_eq!(RenderMode::from_uniform(1), RenderMode::MipDebug);
        assert_eq!(RenderMode::from_uniform(2), RenderMode::DepthDebug);
        assert_eq!(RenderMode::from_uniform(3), RenderMode::DerivativeDebug);
        assert_eq!(RenderMode::from_uniform(4), RenderMode::Overdraw);
        assert_eq!(RenderMode::from_uniform(5), RenderMode::Overshading);
        assert_eq!(RenderMode::from_uniform(6), RenderMode::Standard);
        assert_eq!(RenderMode::from_uniform(u32::MAX), RenderMode::Standard);
    }

    #[test]
    fn test_standard_routes_alpha_by_material() {
        let entry = RenderMode::Standard.entry();
        assert_eq!(entry.opaque, PipelineId::Standard);
        assert_eq!(entry.alpha, PipelineId::Alpha);
        assert_eq!(entry.materials, MaterialSource::Standard);
        assert_eq!(RenderMode::Alpha.entry(), entry);
    }

    #[test]
    fn test_debug_modes_override_alpha_routing() {
        for mode in [
            RenderMode::MipDebug,
            RenderMode::DepthDebug,
            RenderMode::DerivativeDebug,
            RenderMode::Overdraw,
            RenderMode::Overshading,
        ] {
            let entry = mode.entry();
            assert_eq!(entry.opaque, entry.alpha, "{:?}", mode);
            assert_eq!(entry.materials, MaterialSource::Debug, "{:?}", mode);
        }
    }

    #[test]
    fn test_visualization_modes_use_unorm_target() {
        for mode in [RenderMode::Overdraw, RenderMode::Overshading] {
            let entry = mode.entry();
            assert_eq!(entry.target, ColorTarget::Visualization);
            assert_eq!(entry.resolve, PipelineId::VisResolve);
            assert_eq!(entry.clear, ClearKind::Debug);
        }
        let entry = RenderMode::DepthDebug.entry();
        assert_eq!(entry.target, ColorTarget::Hdr);
        assert_eq!(entry.resolve, PipelineId::PostProcess);
    }

    #[test]
    fn test_mode_pipelines_match_target_format() {
        for value in 0..6 {
            let entry = RenderMode::from_uniform(value).entry();
            let expected = match entry.target {
                ColorTarget::Hdr => AttachmentFormat::Hdr,
                ColorTarget::Visualization => AttachmentFormat::Visualization,
            };
            for id in [entry.opaque, entry.alpha] {
                let desc = &PIPELINE_DESCS[id.index()];
                assert_eq!(desc.color, expected, "{}", desc.name);
                assert_eq!(desc.layout, LayoutKind::Scene);
            }
        }
    }

    #[test]
    fn test_fixed_function_state() {
        let desc = |id: PipelineId| &PIPELINE_DESCS[id.index()];

        assert_eq!(desc(PipelineId::Standard).cull, CullMode::Back);
        assert_eq!(desc(PipelineId::Alpha).cull, CullMode::None);
        assert_eq!(desc(PipelineId::Overdraw).depth, Some(DepthState::DISABLED));
        assert_eq!(desc(PipelineId::Overdraw).blend, BlendMode::Additive);
        assert_eq!(desc(PipelineId::Overshading).depth, Some(DepthState::READ_WRITE_STRICT));
        assert_eq!(desc(PipelineId::Overshading).blend, BlendMode::Additive);

        let shadow = desc(PipelineId::Shadow);
        assert_eq!(shadow.vertex_layout, VertexLayout::SHADOW);
        assert_eq!(shadow.color_format(vk::Format::B8G8R8A8_SRGB), None);
        assert_eq!(shadow.depth_format(), Some(SHADOW_FORMAT));
        assert!(shadow.depth_bias);
        assert_eq!(shadow.cull, CullMode::None);
    }

    #[test]
    fn test_only_resolve_pipelines_follow_swapchain() {
        let ids: Vec<PipelineId> = swapchain_dependent().map(|desc| desc.id).collect();
        assert_eq!(ids, vec![PipelineId::PostProcess, PipelineId::VisResolve]);

        for desc in swapchain_dependent() {
            assert_eq!(desc.depth_format(), None);
            assert_eq!(desc.vertex_layout, VertexLayout::NONE);
            assert_eq!(
                desc.color_format(vk::Format::R8G8B8A8_SRGB),
                Some(vk::Format::R8G8B8A8_SRGB)
            );
        }
    }

    #[test]
    fn test_push_constant_is_one_matrix() {
        assert_eq!(PUSH_CONSTANT_SIZE, 64);
    }
}
