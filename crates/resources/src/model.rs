//! The in-memory scene handed to the renderer.

use glam::{Mat4, Vec2, Vec3};

use crate::error::{SceneError, SceneResult};
use crate::material::Material;

/// Colour space of a texture's pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Linear,
    Srgb,
}

/// Decoded RGBA8 texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, row-major.
    pub pixels: Vec<u8>,
    pub color_space: ColorSpace,
}

impl TextureData {
    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// A triangle mesh with de-interleaved attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// May point past the material list; the renderer falls back to a
    /// default material then.
    pub material_index: usize,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl Mesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// One placement of a mesh in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInstance {
    pub mesh_index: usize,
    pub transform: Mat4,
}

/// Everything needed to draw a scene.
#[derive(Debug, Clone, Default)]
pub struct SceneModel {
    pub textures: Vec<TextureData>,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub instances: Vec<MeshInstance>,
}

impl SceneModel {
    /// Checks the structural invariants the renderer relies on.
    ///
    /// Material and texture references are not checked here;
    /// dangling ones are resolved to defaults at upload time.
    pub fn validate(&self) -> SceneResult<()> {
        for texture in &self.textures {
            if texture.width == 0 || texture.height == 0 {
                return Err(SceneError::TextureEmpty {
                    name: texture.name.clone(),
                    width: texture.width,
                    height: texture.height,
                });
            }
            if texture.pixels.len() != texture.expected_len() {
                return Err(SceneError::TextureSize {
                    name: texture.name.clone(),
                    expected: texture.expected_len(),
                    actual: texture.pixels.len(),
                });
            }
        }

        for (i, mesh) in self.meshes.iter().enumerate() {
            validate_mesh(i, mesh)?;
        }

        let mesh_count = self.meshes.len();
        for (i, instance) in self.instances.iter().enumerate() {
            if instance.mesh_index >= mesh_count {
                return Err(SceneError::MeshOutOfRange {
                    instance: i,
                    mesh: instance.mesh_index,
                    mesh_count,
                });
            }
        }

        Ok(())
    }

    pub fn total_vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }

    pub fn total_triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }

    /// World-space bounds over all instances, or `None` for an empty scene.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut points = self.instances.iter().flat_map(|instance| {
            self.meshes
                .get(instance.mesh_index)
                .into_iter()
                .flat_map(|mesh| mesh.positions.iter())
                .map(|p| instance.transform.transform_point3(*p))
        });

        let first = points.next()?;
        Some(points.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }
}

fn validate_mesh(index: usize, mesh: &Mesh) -> SceneResult<()> {
    if mesh.positions.is_empty() || mesh.indices.is_empty() {
        return Err(SceneError::EmptyMesh { mesh: index });
    }

    let expected = mesh.positions.len();
    for (attribute, actual) in [
        ("normals", mesh.normals.len()),
        ("tex_coords", mesh.tex_coords.len()),
    ] {
        if actual != expected {
            return Err(SceneError::AttributeLength {
                mesh: index,
                attribute,
                expected,
                actual,
            });
        }
    }

    if mesh.indices.len() % 3 != 0 {
        return Err(SceneError::PartialTriangle {
            mesh: index,
            count: mesh.indices.len(),
        });
    }

    if let Some(&bad) = mesh.indices.iter().find(|&&i| i as usize >= expected) {
        return Err(SceneError::IndexOutOfRange {
            mesh: index,
            index: bad,
            vertex_count: expected,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        Mesh {
            material_index: 0,
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            tex_coords: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            indices: vec![0, 1, 2],
        }
    }

    fn scene_with(mesh: Mesh) -> SceneModel {
        SceneModel {
            meshes: vec![mesh],
            instances: vec![MeshInstance {
                mesh_index: 0,
                transform: Mat4::IDENTITY,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_scene() {
        let scene = scene_with(triangle());
        assert_eq!(scene.validate(), Ok(()));
        assert_eq!(scene.total_vertex_count(), 3);
        assert_eq!(scene.total_triangle_count(), 1);
    }

    #[test]
    fn test_dangling_material_is_not_an_error() {
        let mut mesh = triangle();
        mesh.material_index = 42;
        assert_eq!(scene_with(mesh).validate(), Ok(()));
    }

    #[test]
    fn test_attribute_length_mismatch() {
        let mut mesh = triangle();
        mesh.tex_coords.pop();
        assert_eq!(
            scene_with(mesh).validate(),
            Err(SceneError::AttributeLength {
                mesh: 0,
                attribute: "tex_coords",
                expected: 3,
                actual: 2,
            })
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let mut mesh = triangle();
        mesh.indices[2] = 3;
        assert!(matches!(
            scene_with(mesh).validate(),
            Err(SceneError::IndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_partial_triangle() {
        let mut mesh = triangle();
        mesh.indices.push(0);
        assert!(matches!(
            scene_with(mesh).validate(),
            Err(SceneError::PartialTriangle { count: 4, .. })
        ));
    }

    #[test]
    fn test_instance_mesh_out_of_range() {
        let mut scene = scene_with(triangle());
        scene.instances[0].mesh_index = 1;
        assert!(matches!(
            scene.validate(),
            Err(SceneError::MeshOutOfRange { mesh: 1, .. })
        ));
    }

    #[test]
    fn test_texture_size_mismatch() {
        let mut scene = scene_with(triangle());
        scene.textures.push(TextureData {
            name: "short".into(),
            width: 2,
            height: 2,
            pixels: vec![0; 15],
            color_space: ColorSpace::Srgb,
        });
        assert!(matches!(
            scene.validate(),
            Err(SceneError::TextureSize { expected: 16, actual: 15, .. })
        ));
    }

    #[test]
    fn test_zero_size_texture_rejected() {
        for (width, height) in [(0, 0), (0, 2), (2, 0)] {
            let mut scene = scene_with(triangle());
            scene.textures.push(TextureData {
                name: "empty".into(),
                width,
                height,
                pixels: vec![],
                color_space: ColorSpace::Linear,
            });
            assert_eq!(
                scene.validate(),
                Err(SceneError::TextureEmpty {
                    name: "empty".into(),
                    width,
                    height,
                })
            );
        }
    }

    #[test]
    fn test_bounds_follow_instance_transforms() {
        let mut scene = scene_with(triangle());
        scene.instances.push(MeshInstance {
            mesh_index: 0,
            transform: Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)),
        });
        let (min, max) = scene.bounds().unwrap();
        assert_eq!(min, Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(max, Vec3::new(1.0, 1.0, 0.0));

        assert!(SceneModel::default().bounds().is_none());
    }
}
