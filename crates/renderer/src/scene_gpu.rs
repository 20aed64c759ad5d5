//! Upload of the scene model to device memory.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use lumen_resources::{ColorSpace, Mesh, SceneModel};
use lumen_rhi::RhiResult;
use lumen_rhi::buffer::{BufferUsage, GpuBuffer};
use lumen_rhi::command::{CommandEncoder, CommandPool};
use lumen_rhi::device::Device;
use lumen_rhi::sync::BufferBarrier;
use lumen_rhi::texture::Texture;

use crate::bindings::material_set_index;
use crate::passes::DrawItem;

/// Device-local vertex streams and indices of one mesh.
pub struct GpuMesh {
    positions: GpuBuffer,
    tex_coords: GpuBuffer,
    normals: GpuBuffer,
    indices: GpuBuffer,
    index_count: u32,
}

impl GpuMesh {
    pub fn streams(&self) -> MeshStreams {
        MeshStreams {
            positions: self.positions.handle(),
            tex_coords: self.tex_coords.handle(),
            normals: self.normals.handle(),
            indices: self.indices.handle(),
            index_count: self.index_count,
        }
    }
}

/// Raw buffer handles of an uploaded mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshStreams {
    pub positions: vk::Buffer,
    pub tex_coords: vk::Buffer,
    pub normals: vk::Buffer,
    pub indices: vk::Buffer,
    pub index_count: u32,
}

/// Staging buffers for one mesh, alive until the upload has completed.
struct MeshStaging {
    positions: GpuBuffer,
    tex_coords: GpuBuffer,
    normals: GpuBuffer,
    indices: GpuBuffer,
}

impl MeshStaging {
    fn new(device: &Arc<Device>, mesh: &Mesh) -> RhiResult<Self> {
        Ok(Self {
            positions: GpuBuffer::new_with_data(
                device,
                BufferUsage::Staging,
                bytemuck::cast_slice(&mesh.positions),
            )?,
            tex_coords: GpuBuffer::new_with_data(
                device,
                BufferUsage::Staging,
                bytemuck::cast_slice(&mesh.tex_coords),
            )?,
            normals: GpuBuffer::new_with_data(
                device,
                BufferUsage::Staging,
                bytemuck::cast_slice(&mesh.normals),
            )?,
            indices: GpuBuffer::new_with_data(
                device,
                BufferUsage::Staging,
                bytemuck::cast_slice(&mesh.indices),
            )?,
        })
    }

    fn destination(&self, device: &Arc<Device>, index_count: u32) -> RhiResult<GpuMesh> {
        Ok(GpuMesh {
            positions: GpuBuffer::new(device, BufferUsage::Vertex, self.positions.size())?,
            tex_coords: GpuBuffer::new(device, BufferUsage::Vertex, self.tex_coords.size())?,
            normals: GpuBuffer::new(device, BufferUsage::Vertex, self.normals.size())?,
            indices: GpuBuffer::new(device, BufferUsage::Index, self.indices.size())?,
            index_count,
        })
    }
}

/// Everything the renderer needs from the scene on the GPU.
pub struct GpuScene {
    meshes: Vec<GpuMesh>,
    textures: Vec<Texture>,
    placeholder: Texture,
    draws: Vec<DrawItem>,
}

impl GpuScene {
    /// Uploads all meshes with one submission, then the textures.
    ///
    /// The model must already be validated.
    pub fn upload(device: &Arc<Device>, pool: &CommandPool, model: &SceneModel) -> RhiResult<Self> {
        let staging = model
            .meshes
            .iter()
            .map(|mesh| MeshStaging::new(device, mesh))
            .collect::<RhiResult<Vec<_>>>()?;
        let meshes = staging
            .iter()
            .zip(&model.meshes)
            .map(|(staging, mesh)| staging.destination(device, mesh.indices.len() as u32))
            .collect::<RhiResult<Vec<_>>>()?;

        pool.submit_and_wait(|cmd| {
            let mut barriers = Vec::with_capacity(meshes.len() * 4);
            for (src, dst) in staging.iter().zip(&meshes) {
                let copies = [
                    (&src.positions, &dst.positions),
                    (&src.tex_coords, &dst.tex_coords),
                    (&src.normals, &dst.normals),
                    (&src.indices, &dst.indices),
                ];
                for (from, to) in copies {
                    cmd.copy_buffer(from.handle(), to.handle(), from.size());
                }
                barriers.extend([
                    BufferBarrier::transfer_to_vertex(dst.positions.handle()),
                    BufferBarrier::transfer_to_vertex(dst.tex_coords.handle()),
                    BufferBarrier::transfer_to_vertex(dst.normals.handle()),
                    BufferBarrier::transfer_to_index(dst.indices.handle()),
                ]);
            }
            cmd.buffer_barriers(&barriers);
            Ok(())
        })?;
        drop(staging);
        debug!("Uploaded {} mesh(es)", meshes.len());

        let textures = model
            .textures
            .iter()
            .map(|texture| {
                debug!(
                    "Uploading texture '{}' ({}x{}, {:?})",
                    texture.name, texture.width, texture.height, texture.color_space
                );
                Texture::from_rgba8(
                    device,
                    pool,
                    "scene texture",
                    texture.width,
                    texture.height,
                    &texture.pixels,
                    texture.color_space == ColorSpace::Srgb,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let placeholder = Texture::placeholder(device, pool)?;

        let streams: Vec<MeshStreams> = meshes.iter().map(GpuMesh::streams).collect();
        let draws = plan_draws(model, &streams);

        info!(
            "Scene uploaded: {} meshes, {} textures, {} draws, {} triangles",
            meshes.len(),
            textures.len(),
            draws.len(),
            model.total_triangle_count()
        );
        Ok(Self {
            meshes,
            textures,
            placeholder,
            draws,
        })
    }

    pub fn texture_views(&self) -> Vec<vk::ImageView> {
        self.textures.iter().map(Texture::view).collect()
    }

    #[inline]
    pub fn placeholder_view(&self) -> vk::ImageView {
        self.placeholder.view()
    }

    #[inline]
    pub fn draws(&self) -> &[DrawItem] {
        &self.draws
    }

    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

/// Resolves every instance to the buffers, material set and pipeline
/// routing it draws with.
pub fn plan_draws(model: &SceneModel, meshes: &[MeshStreams]) -> Vec<DrawItem> {
    let material_count = model.materials.len();
    model
        .instances
        .iter()
        .filter_map(|instance| {
            let mesh = model.meshes.get(instance.mesh_index)?;
            let streams = meshes.get(instance.mesh_index)?;
            let alpha_masked = model
                .materials
                .get(mesh.material_index)
                .is_some_and(|material| material.is_alpha_masked());
            Some(DrawItem {
                transform: instance.transform,
                positions: streams.positions,
                tex_coords: streams.tex_coords,
                normals: streams.normals,
                indices: streams.indices,
                index_count: streams.index_count,
                material_set: material_set_index(mesh.material_index, material_count),
                alpha_masked,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use glam::{Mat4, Vec3};

    use lumen_resources::{AlphaMode, Material, MeshInstance, demo_scene};

    use super::*;

    fn streams(base: u64, index_count: u32) -> MeshStreams {
        MeshStreams {
            positions: vk::Buffer::from_raw(base + 1),
            tex_coords: vk::Buffer::from_raw(base + 2),
            normals: vk::Buffer::from_raw(base + 3),
            indices: vk::Buffer::from_raw(base + 4),
            index_count,
        }
    }

    fn mesh(material_index: usize) -> Mesh {
        Mesh {
            material_index,
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            tex_coords: vec![glam::Vec2::ZERO; 3],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_plan_draws_routes_alpha_and_materials() {
        let model = SceneModel {
            textures: Vec::new(),
            materials: vec![
                Material::default(),
                Material {
                    alpha_mode: AlphaMode::Mask { cutoff: 0.5 },
                    ..Default::default()
                },
            ],
            meshes: vec![mesh(0), mesh(1), mesh(9)],
            instances: vec![
                MeshInstance {
                    mesh_index: 0,
                    transform: Mat4::IDENTITY,
                },
                MeshInstance {
                    mesh_index: 1,
                    transform: Mat4::from_translation(Vec3::X),
                },
                MeshInstance {
                    mesh_index: 2,
                    transform: Mat4::IDENTITY,
                },
            ],
        };
        let gpu = [streams(0, 3), streams(10, 3), streams(20, 3)];

        let draws = plan_draws(&model, &gpu);
        assert_eq!(draws.len(), 3);

        assert!(!draws[0].alpha_masked);
        assert_eq!(draws[0].material_set, 0);
        assert_eq!(draws[0].indices, vk::Buffer::from_raw(4));

        assert!(draws[1].alpha_masked);
        assert_eq!(draws[1].material_set, 1);
        assert_eq!(draws[1].transform, Mat4::from_translation(Vec3::X));

        // Out-of-range material falls back to the default set after the
        // real materials and is drawn as opaque.
        assert!(!draws[2].alpha_masked);
        assert_eq!(draws[2].material_set, 2);
        assert_eq!(draws[2].positions, vk::Buffer::from_raw(21));
    }

    #[test]
    fn test_plan_draws_demo_scene() {
        let model = demo_scene();
        let gpu: Vec<MeshStreams> = model
            .meshes
            .iter()
            .enumerate()
            .map(|(i, mesh)| streams(i as u64 * 10, mesh.indices.len() as u32))
            .collect();

        let draws = plan_draws(&model, &gpu);
        assert_eq!(draws.len(), model.instances.len());
        assert!(draws.iter().any(|draw| draw.alpha_masked));
        assert!(draws
            .iter()
            .all(|draw| draw.material_set <= model.materials.len()));
        assert!(draws
            .iter()
            .any(|draw| draw.material_set == model.materials.len()));
    }
}
