//! Recording tests for one frame, run against a command log instead of a
//! device.

use ash::vk;
use ash::vk::Handle;
use glam::{Mat4, Vec3};

use lumen_renderer::passes::{DepthBias, DrawItem, FrameRecording, ImageTarget, record_frame};
use lumen_renderer::pipelines::{PipelineId, RenderMode};
use lumen_renderer::uniforms::SceneUniform;
use lumen_rhi::command::CommandEncoder;
use lumen_rhi::rendering::{ColorAttachment, ColorLoad, RenderingConfig};
use lumen_rhi::sync::{BufferBarrier, ImageBarrier};

#[derive(Clone, Debug, PartialEq)]
enum Command {
    Image(ImageBarrier),
    Buffer(BufferBarrier),
    UpdateBuffer { buffer: vk::Buffer, len: usize },
    BeginRendering(RenderingConfig),
    EndRendering,
    Viewport(vk::Extent2D),
    DepthBias(f32, f32, f32),
    BindPipeline(vk::Pipeline),
    BindSet { index: u32, set: vk::DescriptorSet },
    PushConstants(usize),
    VertexBuffers(Vec<vk::Buffer>),
    IndexBuffer(vk::Buffer),
    Draw(u32),
    DrawIndexed(u32),
}

#[derive(Default)]
struct Recorder {
    commands: Vec<Command>,
}

impl CommandEncoder for Recorder {
    fn image_barriers(&mut self, barriers: &[ImageBarrier]) {
        self.commands
            .extend(barriers.iter().copied().map(Command::Image));
    }

    fn buffer_barriers(&mut self, barriers: &[BufferBarrier]) {
        self.commands
            .extend(barriers.iter().copied().map(Command::Buffer));
    }

    fn update_buffer(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize, data: &[u8]) {
        self.commands.push(Command::UpdateBuffer {
            buffer,
            len: data.len(),
        });
    }

    fn begin_rendering(&mut self, config: &RenderingConfig) {
        self.commands.push(Command::BeginRendering(config.clone()));
    }

    fn end_rendering(&mut self) {
        self.commands.push(Command::EndRendering);
    }

    fn set_viewport_scissor(&mut self, extent: vk::Extent2D) {
        self.commands.push(Command::Viewport(extent));
    }

    fn set_depth_bias(&mut self, constant_factor: f32, clamp: f32, slope_factor: f32) {
        self.commands
            .push(Command::DepthBias(constant_factor, clamp, slope_factor));
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.commands.push(Command::BindPipeline(pipeline));
    }

    fn bind_descriptor_set(
        &mut self,
        _layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        self.commands.push(Command::BindSet {
            index: set_index,
            set,
        });
    }

    fn push_constants(
        &mut self,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.commands.push(Command::PushConstants(data.len()));
    }

    fn bind_vertex_buffers(&mut self, buffers: &[vk::Buffer]) {
        self.commands.push(Command::VertexBuffers(buffers.to_vec()));
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, _index_type: vk::IndexType) {
        self.commands.push(Command::IndexBuffer(buffer));
    }

    fn draw(&mut self, vertex_count: u32) {
        self.commands.push(Command::Draw(vertex_count));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.commands.push(Command::DrawIndexed(index_count));
    }
}

fn image(raw: u64) -> ImageTarget {
    ImageTarget {
        image: vk::Image::from_raw(raw),
        view: vk::ImageView::from_raw(raw + 1000),
    }
}

const SCENE_BUFFER: u64 = 1;
const SHADOW: u64 = 10;
const HDR: u64 = 20;
const VIS: u64 = 30;
const DEPTH: u64 = 40;
const SWAPCHAIN: u64 = 50;

struct Fixture {
    uniform: SceneUniform,
    pipelines: [vk::Pipeline; PipelineId::COUNT],
    standard: Vec<vk::DescriptorSet>,
    debug: Vec<vk::DescriptorSet>,
    draws: Vec<DrawItem>,
}

impl Fixture {
    fn new(render_mode: u32) -> Self {
        let uniform = SceneUniform::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Vec3::ZERO,
            Vec3::Y,
            Vec3::ONE,
            render_mode,
            Mat4::IDENTITY,
        );

        let draw = |base: u64, material_set: usize, alpha_masked: bool| DrawItem {
            transform: Mat4::from_translation(Vec3::splat(base as f32)),
            positions: vk::Buffer::from_raw(base + 1),
            tex_coords: vk::Buffer::from_raw(base + 2),
            normals: vk::Buffer::from_raw(base + 3),
            indices: vk::Buffer::from_raw(base + 4),
            index_count: 36,
            material_set,
            alpha_masked,
        };

        Self {
            uniform,
            pipelines: PipelineId::ALL.map(|id| vk::Pipeline::from_raw(500 + id.index() as u64)),
            standard: (0..3).map(|i| vk::DescriptorSet::from_raw(600 + i)).collect(),
            debug: (0..3).map(|i| vk::DescriptorSet::from_raw(700 + i)).collect(),
            draws: vec![draw(100, 0, false), draw(200, 1, true), draw(300, 2, false)],
        }
    }

    fn recording(&self) -> FrameRecording<'_> {
        FrameRecording {
            uniform: &self.uniform,
            scene_buffer: vk::Buffer::from_raw(SCENE_BUFFER),
            scene_set: vk::DescriptorSet::from_raw(800),
            scene_layout: vk::PipelineLayout::from_raw(900),
            post_layout: vk::PipelineLayout::from_raw(901),
            pipelines: &self.pipelines,
            standard_materials: &self.standard,
            debug_materials: &self.debug,
            draws: &self.draws,
            shadow: image(SHADOW),
            shadow_extent: vk::Extent2D {
                width: 2048,
                height: 2048,
            },
            depth_bias: DepthBias {
                constant: 1.25,
                clamp: 0.0,
                slope: 1.75,
            },
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            hdr: image(HDR),
            visualization: image(VIS),
            depth: image(DEPTH),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            debug_clear_color: [0.0, 0.1, 0.0, 1.0],
            post_set: vk::DescriptorSet::from_raw(1001),
            vis_set: vk::DescriptorSet::from_raw(1002),
            swapchain: image(SWAPCHAIN),
        }
    }

    fn record(&self) -> Vec<Command> {
        let mut recorder = Recorder::default();
        record_frame(&mut recorder, &self.recording());
        recorder.commands
    }

    fn pipeline(&self, id: PipelineId) -> vk::Pipeline {
        self.pipelines[id.index()]
    }
}

fn position(commands: &[Command], predicate: impl Fn(&Command) -> bool) -> usize {
    commands
        .iter()
        .position(predicate)
        .expect("command not recorded")
}

/// `(old, new)` layouts of every barrier on `raw`, in recording order.
fn transitions(commands: &[Command], raw: u64) -> Vec<(vk::ImageLayout, vk::ImageLayout)> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::Image(barrier) if barrier.image == vk::Image::from_raw(raw) => {
                Some((barrier.old_layout, barrier.new_layout))
            }
            _ => None,
        })
        .collect()
}

fn bound_pipelines(commands: &[Command]) -> Vec<vk::Pipeline> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::BindPipeline(pipeline) => Some(*pipeline),
            _ => None,
        })
        .collect()
}

#[test]
fn test_uniform_upload_comes_first() {
    let fixture = Fixture::new(0);
    let commands = fixture.record();
    let buffer = vk::Buffer::from_raw(SCENE_BUFFER);

    assert_eq!(
        commands[..3],
        [
            Command::Buffer(BufferBarrier::uniform_to_transfer(buffer)),
            Command::UpdateBuffer {
                buffer,
                len: SceneUniform::SIZE
            },
            Command::Buffer(BufferBarrier::transfer_to_uniform(buffer)),
        ]
    );
}

#[test]
fn test_shadow_map_transitions() {
    let commands = Fixture::new(0).record();
    assert_eq!(
        transitions(&commands, SHADOW),
        vec![
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
            ),
            (
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            ),
        ]
    );
}

#[test]
fn test_pass_ordering() {
    let commands = Fixture::new(0).record();

    assert_eq!(
        transitions(&commands, HDR),
        vec![
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            ),
            (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            ),
        ]
    );
    assert_eq!(
        transitions(&commands, SWAPCHAIN),
        vec![
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            ),
            (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR
            ),
        ]
    );

    let image_barrier = |raw: u64, new: vk::ImageLayout| {
        move |command: &Command| {
            matches!(command, Command::Image(b) if b.image == vk::Image::from_raw(raw) && b.new_layout == new)
        }
    };
    let shadow_read = position(
        &commands,
        image_barrier(SHADOW, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL),
    );
    let hdr_read = position(
        &commands,
        image_barrier(HDR, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
    );
    let swapchain_attachment = position(
        &commands,
        image_barrier(SWAPCHAIN, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
    );
    assert!(shadow_read < hdr_read);
    assert!(hdr_read < swapchain_attachment);
    assert_eq!(
        commands.last(),
        Some(&Command::Image(ImageBarrier::color(
            vk::Image::from_raw(SWAPCHAIN),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )))
    );

    // The visualisation target is untouched in standard mode.
    assert!(transitions(&commands, VIS).is_empty());
}

#[test]
fn test_shadow_pass_draws_every_instance_with_bias() {
    let fixture = Fixture::new(0);
    let commands = fixture.record();

    let shadow_begin = position(&commands, |c| {
        matches!(c, Command::BeginRendering(config) if config.color.is_none())
    });
    let shadow_end = shadow_begin
        + position(&commands[shadow_begin..], |c| *c == Command::EndRendering);
    let shadow = &commands[shadow_begin..shadow_end];

    assert!(shadow.contains(&Command::BindPipeline(fixture.pipeline(PipelineId::Shadow))));
    assert!(shadow.contains(&Command::DepthBias(1.25, 0.0, 1.75)));
    assert!(shadow.contains(&Command::Viewport(vk::Extent2D {
        width: 2048,
        height: 2048
    })));
    assert_eq!(
        shadow
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed(36)))
            .count(),
        3
    );
    // Position and texcoord streams only.
    assert!(shadow.contains(&Command::VertexBuffers(vec![
        vk::Buffer::from_raw(101),
        vk::Buffer::from_raw(102)
    ])));
}

#[test]
fn test_standard_mode_routes_alpha_instances() {
    let fixture = Fixture::new(0);
    let commands = fixture.record();

    assert_eq!(
        bound_pipelines(&commands),
        vec![
            fixture.pipeline(PipelineId::Shadow),
            fixture.pipeline(PipelineId::Standard),
            fixture.pipeline(PipelineId::Alpha),
            fixture.pipeline(PipelineId::Standard),
            fixture.pipeline(PipelineId::PostProcess),
        ]
    );

    // Material sets come from the standard array in the main pass.
    let main_sets: Vec<vk::DescriptorSet> = commands
        .iter()
        .filter_map(|c| match c {
            Command::BindSet { index: 1, set } => Some(*set),
            _ => None,
        })
        .skip(3)
        .collect();
    assert_eq!(main_sets, fixture.standard);

    assert!(commands.contains(&Command::BindSet {
        index: 0,
        set: vk::DescriptorSet::from_raw(1001)
    }));
    assert!(commands.contains(&Command::Draw(3)));
}

#[test]
fn test_debug_mode_overrides_alpha_routing() {
    let fixture = Fixture::new(1);
    assert_eq!(fixture.recording().mode(), RenderMode::MipDebug);
    let commands = fixture.record();

    assert_eq!(
        bound_pipelines(&commands),
        vec![
            fixture.pipeline(PipelineId::Shadow),
            fixture.pipeline(PipelineId::MipDebug),
            fixture.pipeline(PipelineId::PostProcess),
        ]
    );
    let main_sets: Vec<vk::DescriptorSet> = commands
        .iter()
        .filter_map(|c| match c {
            Command::BindSet { index: 1, set } => Some(*set),
            _ => None,
        })
        .skip(3)
        .collect();
    assert_eq!(main_sets, fixture.debug);
}

#[test]
fn test_overdraw_renders_to_visualization_target() {
    let fixture = Fixture::new(4);
    let commands = fixture.record();

    assert!(transitions(&commands, HDR).is_empty());
    assert_eq!(
        transitions(&commands, VIS),
        vec![
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            ),
            (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            ),
        ]
    );
    assert_eq!(
        bound_pipelines(&commands),
        vec![
            fixture.pipeline(PipelineId::Shadow),
            fixture.pipeline(PipelineId::Overdraw),
            fixture.pipeline(PipelineId::VisResolve),
        ]
    );
    assert!(commands.contains(&Command::BindSet {
        index: 0,
        set: vk::DescriptorSet::from_raw(1002)
    }));

    let main = commands
        .iter()
        .filter_map(|c| match c {
            Command::BeginRendering(config) => config.color.as_ref(),
            _ => None,
        })
        .next()
        .expect("main pass has a colour attachment");
    assert_eq!(main.image_view, vk::ImageView::from_raw(VIS + 1000));
}

#[test]
fn test_unknown_mode_falls_back_to_standard() {
    let fixture = Fixture::new(42);
    let commands = fixture.record();
    assert!(bound_pipelines(&commands).contains(&fixture.pipeline(PipelineId::Standard)));
    assert!(transitions(&commands, VIS).is_empty());
}

#[test]
fn test_resolve_overwrites_swapchain_without_clear() {
    let commands = Fixture::new(0).record();
    let attachments: Vec<ColorAttachment> = commands
        .iter()
        .filter_map(|c| match c {
            Command::BeginRendering(config) => config.color,
            _ => None,
        })
        .collect();
    assert_eq!(attachments.len(), 2);

    let resolve = attachments[1];
    assert_eq!(resolve.image_view, vk::ImageView::from_raw(SWAPCHAIN + 1000));
    assert_eq!(resolve.load, ColorLoad::DontCare);
    assert!(matches!(attachments[0].load, ColorLoad::Clear(_)));
}
