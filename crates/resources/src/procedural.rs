//! A procedurally generated demo scene.
//!
//! Covers every routing path of the renderer: opaque and alpha-masked
//! materials, a material without a base-colour texture, a material whose
//! texture index points nowhere, and a mesh whose material index points
//! nowhere.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use tracing::debug;

use crate::material::{AlphaMode, Material};
use crate::model::{ColorSpace, Mesh, MeshInstance, SceneModel, TextureData};

const TEXTURE_SIZE: u32 = 64;

/// Material index used by one mesh that is past the end of the material list.
pub const DANGLING_MATERIAL_INDEX: usize = 17;

/// Texture index used by one material that is past the end of the texture list.
pub const DANGLING_TEXTURE_INDEX: usize = 99;

/// Builds the demo scene.
pub fn demo_scene() -> SceneModel {
    let textures = vec![
        checker_texture(
            "ground_checker",
            8,
            [200, 200, 200, 255],
            [60, 60, 70, 255],
        ),
        checker_texture("cube_checker", 16, [220, 120, 40, 255], [90, 40, 20, 255]),
        metal_rough_texture("metal_rough"),
        cutout_texture("cutout"),
    ];

    let materials = vec![
        // 0: ground
        Material {
            base_color_texture: Some(0),
            metal_rough_texture: Some(2),
            metallic_factor: 0.0,
            ..Default::default()
        },
        // 1: cubes
        Material {
            base_color_texture: Some(1),
            metal_rough_texture: Some(2),
            ..Default::default()
        },
        // 2: alpha-tested foliage card
        Material {
            base_color_texture: Some(3),
            alpha_mask_texture: Some(3),
            alpha_mode: AlphaMode::Mask { cutoff: 0.5 },
            metallic_factor: 0.0,
            ..Default::default()
        },
        // 3: untextured base colour, dangling metal/rough reference
        Material {
            base_color_texture: None,
            metal_rough_texture: Some(DANGLING_TEXTURE_INDEX),
            base_color_factor: Vec4::new(0.2, 0.5, 0.9, 1.0),
            ..Default::default()
        },
    ];

    let meshes = vec![
        plane(0, 20.0, 10.0),
        cube(1, 0.5),
        quad(2, 1.0),
        cube(3, 0.35),
        cube(DANGLING_MATERIAL_INDEX, 0.25),
    ];

    let mut instances = vec![MeshInstance {
        mesh_index: 0,
        transform: Mat4::IDENTITY,
    }];

    for i in 0..5 {
        let x = (i as f32 - 2.0) * 2.0;
        instances.push(MeshInstance {
            mesh_index: 1,
            transform: Mat4::from_rotation_translation(
                Quat::from_rotation_y(i as f32 * 0.4),
                Vec3::new(x, 0.5, -6.0),
            ),
        });
    }

    instances.extend([
        MeshInstance {
            mesh_index: 2,
            transform: Mat4::from_translation(Vec3::new(0.0, 1.0, -3.0)),
        },
        MeshInstance {
            mesh_index: 3,
            transform: Mat4::from_translation(Vec3::new(-2.5, 0.35, -3.5)),
        },
        MeshInstance {
            mesh_index: 4,
            transform: Mat4::from_translation(Vec3::new(2.5, 0.25, -3.5)),
        },
    ]);

    let scene = SceneModel {
        textures,
        materials,
        meshes,
        instances,
    };

    debug!(
        "Demo scene: {} meshes, {} instances, {} vertices, {} triangles",
        scene.meshes.len(),
        scene.instances.len(),
        scene.total_vertex_count(),
        scene.total_triangle_count()
    );

    scene
}

/// Appends one square face centred at `center`, spanning `u` and `v`.
///
/// `u × v` must equal `normal` so the face winds counter-clockwise when
/// seen from the front.
fn push_face(mesh: &mut Mesh, center: Vec3, u: Vec3, v: Vec3, normal: Vec3, uv_scale: f32) {
    let base = mesh.positions.len() as u32;
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    for (su, sv) in corners {
        mesh.positions.push(center + u * su + v * sv);
        mesh.normals.push(normal);
        mesh.tex_coords
            .push(Vec2::new((su + 1.0) * 0.5, (1.0 - sv) * 0.5) * uv_scale);
    }

    mesh.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

fn plane(material_index: usize, size: f32, uv_repeat: f32) -> Mesh {
    let mut mesh = Mesh {
        material_index,
        ..Default::default()
    };
    let half = size * 0.5;
    push_face(
        &mut mesh,
        Vec3::ZERO,
        Vec3::X * half,
        Vec3::NEG_Z * half,
        Vec3::Y,
        uv_repeat,
    );
    mesh
}

fn quad(material_index: usize, half: f32) -> Mesh {
    let mut mesh = Mesh {
        material_index,
        ..Default::default()
    };
    push_face(
        &mut mesh,
        Vec3::ZERO,
        Vec3::X * half,
        Vec3::Y * half,
        Vec3::Z,
        1.0,
    );
    mesh
}

fn cube(material_index: usize, half: f32) -> Mesh {
    let mut mesh = Mesh {
        material_index,
        ..Default::default()
    };

    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    for (normal, u, v) in FACES {
        push_face(&mut mesh, normal * half, u * half, v * half, normal, 1.0);
    }
    mesh
}

fn checker_texture(name: &str, cell: u32, a: [u8; 4], b: [u8; 4]) -> TextureData {
    let pixels = (0..TEXTURE_SIZE * TEXTURE_SIZE)
        .flat_map(|i| {
            let (x, y) = (i % TEXTURE_SIZE, i / TEXTURE_SIZE);
            if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b }
        })
        .collect();

    TextureData {
        name: name.to_string(),
        width: TEXTURE_SIZE,
        height: TEXTURE_SIZE,
        pixels,
        color_space: ColorSpace::Srgb,
    }
}

/// Roughness ramps along X (G channel), metalness along Y (B channel).
fn metal_rough_texture(name: &str) -> TextureData {
    let scale = 255.0 / (TEXTURE_SIZE - 1) as f32;
    let pixels = (0..TEXTURE_SIZE * TEXTURE_SIZE)
        .flat_map(|i| {
            let (x, y) = (i % TEXTURE_SIZE, i / TEXTURE_SIZE);
            let roughness = (x as f32 * scale) as u8;
            let metalness = (y as f32 * scale) as u8;
            [0, roughness, metalness, 255]
        })
        .collect();

    TextureData {
        name: name.to_string(),
        width: TEXTURE_SIZE,
        height: TEXTURE_SIZE,
        pixels,
        color_space: ColorSpace::Linear,
    }
}

/// A green disc on a fully transparent background.
fn cutout_texture(name: &str) -> TextureData {
    let center = (TEXTURE_SIZE as f32 - 1.0) * 0.5;
    let radius = TEXTURE_SIZE as f32 * 0.45;
    let pixels = (0..TEXTURE_SIZE * TEXTURE_SIZE)
        .flat_map(|i| {
            let p = Vec2::new((i % TEXTURE_SIZE) as f32, (i / TEXTURE_SIZE) as f32);
            let inside = p.distance(Vec2::splat(center)) <= radius;
            let alpha = if inside { 255 } else { 0 };
            [40, 160, 60, alpha]
        })
        .collect();

    TextureData {
        name: name.to_string(),
        width: TEXTURE_SIZE,
        height: TEXTURE_SIZE,
        pixels,
        color_space: ColorSpace::Srgb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_normal(mesh: &Mesh, triangle: usize) -> Vec3 {
        let i = &mesh.indices[triangle * 3..triangle * 3 + 3];
        let [a, b, c] = [0, 1, 2].map(|k| mesh.positions[i[k] as usize]);
        (b - a).cross(c - a).normalize()
    }

    #[test]
    fn test_cube_winds_outward() {
        let mesh = cube(0, 1.0);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);

        for t in 0..mesh.triangle_count() {
            let normal = face_normal(&mesh, t);
            let stored = mesh.normals[mesh.indices[t * 3] as usize];
            assert!(normal.abs_diff_eq(stored, 1e-5), "triangle {}", t);
        }
    }

    #[test]
    fn test_plane_faces_up() {
        let mesh = plane(0, 4.0, 2.0);
        assert!(face_normal(&mesh, 0).abs_diff_eq(Vec3::Y, 1e-5));
        assert!(mesh.tex_coords.iter().all(|uv| uv.max_element() <= 2.0));
    }

    #[test]
    fn test_cutout_has_transparent_corners() {
        let texture = cutout_texture("t");
        assert_eq!(texture.pixels[3], 0);
        let center = ((TEXTURE_SIZE / 2) * TEXTURE_SIZE + TEXTURE_SIZE / 2) as usize * 4;
        assert_eq!(texture.pixels[center + 3], 255);
    }
}
