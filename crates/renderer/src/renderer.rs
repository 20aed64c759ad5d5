//! Main renderer orchestration.
//!
//! [`Renderer`] builds every long-lived resource against one device and
//! drives one frame per [`Renderer::render_frame`] call through the
//! [`FrameScheduler`].
//!
//! # Resource Destruction Order
//!
//! Struct fields drop in declaration order, so `FrameContext` lists the
//! per-frame objects first and the swapchain and device last. Everything
//! that destroys a native handle holds the device (and transitively the
//! instance) alive, so the device is released after every dependent
//! resource, then the surface, then the instance.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use lumen_core::Config;
use lumen_platform::Window;
use lumen_resources::SceneModel;
use lumen_rhi::RhiResult;
use lumen_rhi::command::CommandPool;
use lumen_rhi::descriptor::DescriptorPool;
use lumen_rhi::device::Device;
use lumen_rhi::instance::Instance;
use lumen_rhi::physical_device::select_physical_device;
use lumen_rhi::sampler::{Sampler, SamplerKind};
use lumen_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain, SwapchainChanges};
use lumen_scene::{ShadowLight, ViewerState};

use crate::bindings::{
    BindingLayouts, MaterialBindings, POOL_CAPACITY, PostBindings, SceneBinding,
};
use crate::error::RendererResult;
use crate::passes::{DepthBias, FrameRecording, ImageTarget, record_frame};
use crate::pipelines::{PipelineLayouts, PipelineSet};
use crate::scene_gpu::GpuScene;
use crate::scheduler::{FrameBackend, FrameScheduler, FrameSlots, TickOutcome};
use crate::targets::{RenderTargets, ShadowMap};
use crate::uniforms::{PostParams, SceneUniform};

/// The four samplers of the binding model.
struct Samplers {
    material: Sampler,
    debug: Sampler,
    post: Sampler,
    shadow: Sampler,
}

impl Samplers {
    fn new(device: &Arc<Device>) -> RhiResult<Self> {
        let max_anisotropy = device.physical().max_sampler_anisotropy();
        Ok(Self {
            material: Sampler::new(device, SamplerKind::Material { max_anisotropy })?,
            debug: Sampler::new(device, SamplerKind::Debug)?,
            post: Sampler::new(device, SamplerKind::PostProcess)?,
            shadow: Sampler::new(device, SamplerKind::Shadow)?,
        })
    }
}

/// Settings read from [`Config`] that recording needs every frame.
struct FrameSettings {
    shader_dir: PathBuf,
    depth_bias: DepthBias,
    clear_color: [f32; 4],
    debug_clear_color: [f32; 4],
}

/// Device, swapchain and every GPU resource a frame touches.
struct FrameContext {
    uniform: SceneUniform,
    post_params: PostParams,
    window_extent: vk::Extent2D,
    settings: FrameSettings,
    light: ShadowLight,

    slots: FrameSlots,
    post: PostBindings,
    scene_binding: SceneBinding,
    materials: MaterialBindings,
    pipelines: PipelineSet,
    pipeline_layouts: PipelineLayouts,
    descriptor_pool: DescriptorPool,
    binding_layouts: BindingLayouts,
    samplers: Samplers,
    scene: GpuScene,
    shadow_map: ShadowMap,
    targets: RenderTargets,
    command_pool: CommandPool,
    swapchain: Swapchain,
    device: Arc<Device>,
}

impl FrameContext {
    fn update(&mut self, viewer: &ViewerState) {
        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let camera = &viewer.camera;

        self.uniform = SceneUniform::new(
            camera.view_matrix(),
            camera.projection_matrix(aspect),
            camera.position(),
            self.light.position,
            self.light.color,
            viewer.render_mode(),
            self.light.view_projection(),
        );
        self.post_params = PostParams::new(viewer.mosaic());
    }
}

impl FrameBackend for FrameContext {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slots.get(slot).fence().wait()
    }

    fn acquire(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        self.swapchain
            .acquire_next_image(self.slots.get(slot).acquired().handle())
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slots.get(slot).fence().reset()
    }

    fn record_and_submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.post.write_params(slot, &self.post_params)?;

        let pipelines = self.pipelines.handles();
        let image = image_index as usize;
        let frame = FrameRecording {
            uniform: &self.uniform,
            scene_buffer: self.scene_binding.uniform_buffer(),
            scene_set: self.scene_binding.set(),
            scene_layout: self.pipeline_layouts.scene().handle(),
            post_layout: self.pipeline_layouts.post().handle(),
            pipelines: &pipelines,
            standard_materials: self.materials.standard(),
            debug_materials: self.materials.debug(),
            draws: self.scene.draws(),
            shadow: ImageTarget {
                image: self.shadow_map.image(),
                view: self.shadow_map.view(),
            },
            shadow_extent: self.shadow_map.extent(),
            depth_bias: self.settings.depth_bias,
            extent: self.swapchain.extent(),
            hdr: ImageTarget {
                image: self.targets.hdr().image(),
                view: self.targets.hdr().view(),
            },
            visualization: ImageTarget {
                image: self.targets.visualization().image(),
                view: self.targets.visualization().view(),
            },
            depth: ImageTarget {
                image: self.targets.depth().image(),
                view: self.targets.depth().view(),
            },
            clear_color: self.settings.clear_color,
            debug_clear_color: self.settings.debug_clear_color,
            post_set: self.post.post_set(slot),
            vis_set: self.post.vis_set(slot),
            swapchain: ImageTarget {
                image: self.swapchain.image(image),
                view: self.swapchain.image_view(image),
            },
        };

        let frame_slot = self.slots.get_mut(slot);
        let acquired = frame_slot.acquired().handle();
        let render_finished = frame_slot.render_finished().handle();
        let fence = frame_slot.fence().handle();

        let cmd = frame_slot.command_buffer();
        cmd.reset()?;
        cmd.begin(true)?;
        record_frame(cmd, &frame);
        cmd.end()?;

        let wait = [vk::SemaphoreSubmitInfo::default()
            .semaphore(acquired)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(render_finished)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle())];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signal);

        self.device.submit_graphics(&[submit], fence)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        self.swapchain
            .present(image_index, self.slots.get(slot).render_finished().handle())
    }

    fn recreate_swapchain(&mut self) -> RhiResult<Option<SwapchainChanges>> {
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(None);
        }

        self.device.wait_idle()?;
        self.swapchain.recreate(self.window_extent).map(Some)
    }

    fn rebuild_targets(&mut self) -> RhiResult<()> {
        self.targets = RenderTargets::new(&self.device, self.swapchain.extent())?;
        self.post
            .rebind_targets(&self.device, &self.targets, self.samplers.post.handle());
        Ok(())
    }

    fn rebuild_pipelines(&mut self) -> RhiResult<()> {
        self.pipelines.rebuild_for_format(
            &self.device,
            &self.settings.shader_dir,
            &self.pipeline_layouts,
            self.swapchain.format(),
        )?;
        Ok(())
    }

    fn rebuild_slots(&mut self) -> RhiResult<usize> {
        let slot_count = self.swapchain.image_count();
        self.slots.rebuild(&self.command_pool, slot_count)?;
        self.post.ensure_slots(
            &self.device,
            &self.descriptor_pool,
            &self.binding_layouts,
            slot_count,
            &self.targets,
            self.samplers.post.handle(),
        )?;
        Ok(slot_count)
    }
}

/// Owns the device, the swapchain and the scene on the GPU, and renders
/// one frame per call.
pub struct Renderer {
    scheduler: FrameScheduler,
    frame: FrameContext,
}

impl Renderer {
    /// Creates the device and swapchain for `window` and uploads `scene`.
    ///
    /// # Errors
    ///
    /// Fails if the scene is malformed, no GPU qualifies, or any resource
    /// creation fails.
    pub fn new(window: &Window, config: &Config, scene: &SceneModel) -> RendererResult<Self> {
        scene.validate()?;
        let window_extent = window.extent();
        info!(
            "Initializing renderer ({}x{})",
            window_extent.width, window_extent.height
        );

        let surface_extensions = window.required_extensions()?;
        let instance = Arc::new(Instance::new(
            c"lumen",
            config.renderer.validation,
            &surface_extensions,
        )?);
        let surface = window.create_surface(&instance)?;
        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(instance, physical)?;
        let swapchain = Swapchain::new(&device, surface, window_extent)?;
        let slot_count = swapchain.image_count();

        let graphics_family = device.queue_families().graphics;
        let command_pool = CommandPool::new(&device, graphics_family)?;
        let upload_pool = CommandPool::new_transient(&device, graphics_family)?;

        let gpu_scene = GpuScene::upload(&device, &upload_pool, scene)?;
        let targets = RenderTargets::new(&device, swapchain.extent())?;
        let shadow_map = ShadowMap::new(&device, config.renderer.shadow_map_resolution)?;
        let samplers = Samplers::new(&device)?;

        let binding_layouts = BindingLayouts::new(&device)?;
        let descriptor_pool = DescriptorPool::new(&device, POOL_CAPACITY)?;
        let materials = MaterialBindings::new(
            &device,
            &descriptor_pool,
            &binding_layouts,
            &scene.materials,
            &gpu_scene.texture_views(),
            gpu_scene.placeholder_view(),
            samplers.material.handle(),
            samplers.debug.handle(),
        )?;
        let scene_binding = SceneBinding::new(
            &device,
            &descriptor_pool,
            &binding_layouts,
            shadow_map.view(),
            samplers.shadow.handle(),
        )?;
        let post = PostBindings::new(
            &device,
            &descriptor_pool,
            &binding_layouts,
            slot_count,
            &targets,
            samplers.post.handle(),
        )?;

        let pipeline_layouts = PipelineLayouts::new(&device, &binding_layouts)?;
        let pipelines = PipelineSet::new(
            &device,
            &config.renderer.shader_dir,
            &pipeline_layouts,
            swapchain.format(),
        )?;
        let slots = FrameSlots::new(&device, &command_pool, slot_count)?;

        let settings = FrameSettings {
            shader_dir: config.renderer.shader_dir.clone(),
            depth_bias: DepthBias {
                constant: config.renderer.depth_bias_constant,
                clamp: 0.0,
                slope: config.renderer.depth_bias_slope,
            },
            clear_color: config.renderer.clear_color,
            debug_clear_color: config.renderer.debug_clear_color,
        };

        info!("Renderer initialized with {} frame slots", slot_count);
        Ok(Self {
            scheduler: FrameScheduler::new(slot_count),
            frame: FrameContext {
                uniform: SceneUniform::default(),
                post_params: PostParams::default(),
                window_extent,
                settings,
                light: ShadowLight::from(&config.light),
                slots,
                post,
                scene_binding,
                materials,
                pipelines,
                pipeline_layouts,
                descriptor_pool,
                binding_layouts,
                samplers,
                scene: gpu_scene,
                shadow_map,
                targets,
                command_pool,
                swapchain,
                device,
            },
        })
    }

    /// Records the new drawable size and schedules a swapchain rebuild.
    ///
    /// A zero size (minimized window) postpones rendering until the window
    /// has an area again.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        if extent == self.frame.window_extent {
            return;
        }
        debug!("Resize requested: {}x{}", extent.width, extent.height);
        self.frame.window_extent = extent;
        self.scheduler.invalidate();
    }

    /// Runs one scheduler tick with the viewer's current state.
    ///
    /// # Errors
    ///
    /// Any error is fatal; an invalidated swapchain is handled internally.
    pub fn render_frame(&mut self, viewer: &ViewerState) -> RhiResult<TickOutcome> {
        self.frame.update(viewer);
        self.scheduler
            .tick(&mut self.frame, viewer.close_requested())
    }

    #[inline]
    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Number of meshes uploaded to the GPU.
    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.frame.scene.mesh_count()
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.frame.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.frame.device.wait_idle() {
            error!("Failed to wait for device idle during cleanup: {}", e);
        }
        info!(
            "Renderer destroyed after {} frames",
            self.scheduler.frames_submitted()
        );
    }
}
