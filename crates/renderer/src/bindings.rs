//! The descriptor binding model.
//!
//! Three layouts live for the whole run:
//! - scene (set 0): scene uniform buffer and the shadow map
//! - object (set 1): base colour and metal/roughness (bound twice)
//! - post (set 0 of the resolve pipelines): source colour target and the
//!   post-process parameter buffer
//!
//! Material sets are written once at load time. Post sets exist once per
//! frame slot and are rewritten in place when the targets they read are
//! recreated.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use lumen_resources::Material;
use lumen_rhi::RhiResult;
use lumen_rhi::buffer::{BufferUsage, GpuBuffer};
use lumen_rhi::descriptor::{
    DescriptorBinding, DescriptorPool, DescriptorSetLayout, DescriptorWriter, PoolCapacity,
};
use lumen_rhi::device::Device;

use crate::targets::RenderTargets;
use crate::uniforms::{PostParams, SceneUniform};

/// Capacity of the single descriptor pool.
pub const POOL_CAPACITY: PoolCapacity = PoolCapacity {
    uniform_buffers: 2048,
    combined_image_samplers: 2048,
    max_sets: 1024,
};

/// Object-set binding of the base colour texture.
pub const BASE_COLOR_BINDING: u32 = 0;
/// The metal/roughness texture is bound to both of these.
pub const METAL_ROUGH_BINDINGS: [u32; 2] = [1, 2];

/// The three fixed descriptor-set layouts.
pub struct BindingLayouts {
    pub scene: DescriptorSetLayout,
    pub object: DescriptorSetLayout,
    pub post: DescriptorSetLayout,
}

impl BindingLayouts {
    pub fn new(device: &Arc<Device>) -> RhiResult<Self> {
        let scene = DescriptorSetLayout::new(
            device,
            &[
                DescriptorBinding::uniform_buffer(
                    0,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                ),
                DescriptorBinding::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
            ],
        )?;

        let object = DescriptorSetLayout::new(
            device,
            &[
                DescriptorBinding::combined_image_sampler(
                    BASE_COLOR_BINDING,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
                DescriptorBinding::combined_image_sampler(
                    METAL_ROUGH_BINDINGS[0],
                    vk::ShaderStageFlags::FRAGMENT,
                ),
                DescriptorBinding::combined_image_sampler(
                    METAL_ROUGH_BINDINGS[1],
                    vk::ShaderStageFlags::FRAGMENT,
                ),
            ],
        )?;

        let post = DescriptorSetLayout::new(
            device,
            &[
                DescriptorBinding::combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT),
                DescriptorBinding::uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT),
            ],
        )?;

        Ok(Self {
            scene,
            object,
            post,
        })
    }
}

/// What a material texture slot ends up sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureRef {
    Scene(usize),
    Placeholder,
}

impl TextureRef {
    /// Resolves a texture index, substituting the placeholder for absent
    /// or out-of-range indices.
    pub fn resolve(index: Option<usize>, texture_count: usize) -> Self {
        match index {
            Some(i) if i < texture_count => TextureRef::Scene(i),
            _ => TextureRef::Placeholder,
        }
    }

    pub fn view(self, texture_views: &[vk::ImageView], placeholder: vk::ImageView) -> vk::ImageView {
        match self {
            TextureRef::Scene(i) => texture_views.get(i).copied().unwrap_or(placeholder),
            TextureRef::Placeholder => placeholder,
        }
    }
}

/// Textures for the object-set bindings 0, 1 and 2.
///
/// A missing material (out-of-range index) gets placeholders everywhere.
pub fn material_texture_refs(material: Option<&Material>, texture_count: usize) -> [TextureRef; 3] {
    let Some(material) = material else {
        return [TextureRef::Placeholder; 3];
    };
    let base = TextureRef::resolve(material.base_color_texture, texture_count);
    let metal_rough = TextureRef::resolve(material.metal_rough_texture, texture_count);
    [base, metal_rough, metal_rough]
}

/// Index into a material set array for `material_index`.
///
/// The array has one extra trailing set (all placeholders) that any
/// out-of-range material index maps to.
#[inline]
pub fn material_set_index(material_index: usize, material_count: usize) -> usize {
    material_index.min(material_count)
}

/// Writes one object set.
pub fn write_material_set(
    writer: &mut DescriptorWriter,
    set: vk::DescriptorSet,
    refs: [TextureRef; 3],
    texture_views: &[vk::ImageView],
    placeholder: vk::ImageView,
    sampler: vk::Sampler,
) {
    let bindings = [
        BASE_COLOR_BINDING,
        METAL_ROUGH_BINDINGS[0],
        METAL_ROUGH_BINDINGS[1],
    ];
    for (binding, reference) in bindings.into_iter().zip(refs) {
        writer.combined_image_sampler(
            set,
            binding,
            reference.view(texture_views, placeholder),
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }
}

/// Per-material object sets, one array per sampler.
pub struct MaterialBindings {
    standard: Vec<vk::DescriptorSet>,
    debug: Vec<vk::DescriptorSet>,
    material_count: usize,
}

impl MaterialBindings {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &Arc<Device>,
        pool: &DescriptorPool,
        layouts: &BindingLayouts,
        materials: &[Material],
        texture_views: &[vk::ImageView],
        placeholder: vk::ImageView,
        material_sampler: vk::Sampler,
        debug_sampler: vk::Sampler,
    ) -> RhiResult<Self> {
        let count = materials.len() + 1;
        let standard = pool.allocate(&layouts.object, count)?;
        let debug = pool.allocate(&layouts.object, count)?;

        let mut writer = DescriptorWriter::new();
        for i in 0..count {
            let material = materials.get(i);
            let refs = material_texture_refs(material, texture_views.len());
            if let Some(material) = material {
                log_substitutions(i, material, refs);
            }
            write_material_set(&mut writer, standard[i], refs, texture_views, placeholder, material_sampler);
            write_material_set(&mut writer, debug[i], refs, texture_views, placeholder, debug_sampler);
        }
        writer.submit(device);

        debug!("Created {} material set(s) per sampler", count);
        Ok(Self {
            standard,
            debug,
            material_count: materials.len(),
        })
    }

    #[inline]
    pub fn standard(&self) -> &[vk::DescriptorSet] {
        &self.standard
    }

    #[inline]
    pub fn debug(&self) -> &[vk::DescriptorSet] {
        &self.debug
    }

    #[inline]
    pub fn material_count(&self) -> usize {
        self.material_count
    }
}

fn log_substitutions(index: usize, material: &Material, refs: [TextureRef; 3]) {
    let slots = [
        ("base colour", material.base_color_texture, refs[0]),
        ("metal/roughness", material.metal_rough_texture, refs[1]),
    ];
    for (slot, requested, resolved) in slots {
        if resolved == TextureRef::Placeholder {
            match requested {
                Some(texture) => warn!(
                    "Material {}: {} texture {} does not exist, using placeholder",
                    index, slot, texture
                ),
                None => debug!("Material {}: no {} texture, using placeholder", index, slot),
            }
        }
    }
}

/// The scene set and the uniform buffer behind it.
pub struct SceneBinding {
    uniform: GpuBuffer,
    set: vk::DescriptorSet,
}

impl SceneBinding {
    pub fn new(
        device: &Arc<Device>,
        pool: &DescriptorPool,
        layouts: &BindingLayouts,
        shadow_view: vk::ImageView,
        shadow_sampler: vk::Sampler,
    ) -> RhiResult<Self> {
        let uniform = GpuBuffer::new(device, BufferUsage::Uniform, SceneUniform::SIZE as u64)?;
        let set = pool.allocate_one(&layouts.scene)?;

        DescriptorWriter::new()
            .uniform_buffer(set, 0, uniform.handle(), SceneUniform::SIZE as u64)
            .combined_image_sampler(
                set,
                1,
                shadow_view,
                shadow_sampler,
                vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
            )
            .submit(device);

        Ok(Self { uniform, set })
    }

    #[inline]
    pub fn uniform_buffer(&self) -> vk::Buffer {
        self.uniform.handle()
    }

    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }
}

/// Per-slot post-process parameters and resolve sets.
///
/// Slot `i` owns `params[i]`, `post_sets[i]` (reads the HDR target) and
/// `vis_sets[i]` (reads the visualisation target). Both sets of a slot
/// share its parameter buffer.
pub struct PostBindings {
    params: Vec<GpuBuffer>,
    post_sets: Vec<vk::DescriptorSet>,
    vis_sets: Vec<vk::DescriptorSet>,
}

impl PostBindings {
    pub fn new(
        device: &Arc<Device>,
        pool: &DescriptorPool,
        layouts: &BindingLayouts,
        slot_count: usize,
        targets: &RenderTargets,
        sampler: vk::Sampler,
    ) -> RhiResult<Self> {
        let mut bindings = Self {
            params: Vec::new(),
            post_sets: Vec::new(),
            vis_sets: Vec::new(),
        };
        bindings.ensure_slots(device, pool, layouts, slot_count, targets, sampler)?;
        Ok(bindings)
    }

    /// Grows the per-slot resources to at least `slot_count`.
    ///
    /// Existing sets are kept; the pool is never reset.
    pub fn ensure_slots(
        &mut self,
        device: &Arc<Device>,
        pool: &DescriptorPool,
        layouts: &BindingLayouts,
        slot_count: usize,
        targets: &RenderTargets,
        sampler: vk::Sampler,
    ) -> RhiResult<()> {
        let existing = self.params.len();
        if slot_count <= existing {
            return Ok(());
        }
        let added = slot_count - existing;

        let post_sets = pool.allocate(&layouts.post, added)?;
        let vis_sets = pool.allocate(&layouts.post, added)?;
        let mut writer = DescriptorWriter::new();

        for (post_set, vis_set) in post_sets.iter().zip(&vis_sets) {
            let params = GpuBuffer::new(device, BufferUsage::HostUniform, PostParams::SIZE as u64)?;
            params.write_pod(&PostParams::default())?;
            for set in [*post_set, *vis_set] {
                writer.uniform_buffer(set, 1, params.handle(), PostParams::SIZE as u64);
            }
            self.params.push(params);
        }
        self.post_sets.extend(post_sets);
        self.vis_sets.extend(vis_sets);
        writer.submit(device);

        self.write_targets(device, existing..slot_count, targets, sampler);
        debug!("Post bindings grown to {} slot(s)", slot_count);
        Ok(())
    }

    /// Points every set at the current targets. Uniform entries are left
    /// alone.
    pub fn rebind_targets(&self, device: &Device, targets: &RenderTargets, sampler: vk::Sampler) {
        self.write_targets(device, 0..self.post_sets.len(), targets, sampler);
    }

    fn write_targets(
        &self,
        device: &Device,
        slots: std::ops::Range<usize>,
        targets: &RenderTargets,
        sampler: vk::Sampler,
    ) {
        let mut writer = DescriptorWriter::new();
        for slot in slots {
            let pairs = [
                (self.post_sets[slot], targets.hdr().view()),
                (self.vis_sets[slot], targets.visualization().view()),
            ];
            for (set, view) in pairs {
                writer.combined_image_sampler(
                    set,
                    0,
                    view,
                    sampler,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            }
        }
        writer.submit(device);
    }

    /// Writes the parameters of `slot` through its mapping.
    ///
    /// The caller must have waited on the slot's fence.
    pub fn write_params(&self, slot: usize, params: &PostParams) -> RhiResult<()> {
        match self.params.get(slot) {
            Some(buffer) => buffer.write_pod(params),
            None => Err(lumen_rhi::RhiError::InvalidArgument(format!(
                "no post parameters for slot {}",
                slot
            ))),
        }
    }

    #[inline]
    pub fn post_set(&self, slot: usize) -> vk::DescriptorSet {
        self.post_sets[slot]
    }

    #[inline]
    pub fn vis_set(&self, slot: usize) -> vk::DescriptorSet {
        self.vis_sets[slot]
    }
}
