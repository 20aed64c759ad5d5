//! Uniform buffer layouts shared with the shaders.
//!
//! All structures are `#[repr(C)]` and `Pod` so they can be copied into
//! buffers as bytes. Field order and padding follow std140.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Per-frame scene data (set 0, binding 0).
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Offset 192: camera position (16 bytes)
/// - Offset 208: light position (16 bytes)
/// - Offset 224: light colour (16 bytes)
/// - Offset 240: render mode + 3 × u32 padding (16 bytes)
/// - Offset 256: light view-projection matrix (64 bytes)
/// - Total size: 320 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec4,
    pub light_position: Vec4,
    pub light_color: Vec4,
    pub render_mode: u32,
    pub _padding: [u32; 3],
    pub light_view_projection: Mat4,
}

impl SceneUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(
        view: Mat4,
        projection: Mat4,
        camera_position: Vec3,
        light_position: Vec3,
        light_color: Vec3,
        render_mode: u32,
        light_view_projection: Mat4,
    ) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            camera_position: camera_position.extend(1.0),
            light_position: light_position.extend(1.0),
            light_color: light_color.extend(1.0),
            render_mode,
            _padding: [0; 3],
            light_view_projection,
        }
    }
}

/// Post-process parameters (post set, binding 1).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PostParams {
    /// Non-zero enables the mosaic effect.
    pub mosaic: i32,
    pub _padding: [i32; 3],
}

impl PostParams {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(mosaic: bool) -> Self {
        Self {
            mosaic: i32::from(mosaic),
            _padding: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn test_scene_uniform_size() {
        assert_eq!(SceneUniform::SIZE, 320);
        assert_eq!(std::mem::align_of::<SceneUniform>(), 16);
    }

    #[test]
    fn test_scene_uniform_offsets() {
        assert_eq!(offset_of!(SceneUniform, view_projection), 128);
        assert_eq!(offset_of!(SceneUniform, camera_position), 192);
        assert_eq!(offset_of!(SceneUniform, light_color), 224);
        assert_eq!(offset_of!(SceneUniform, render_mode), 240);
        assert_eq!(offset_of!(SceneUniform, light_view_projection), 256);
    }

    #[test]
    fn test_scene_uniform_new() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0);
        let uniform = SceneUniform::new(
            view,
            projection,
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::Y,
            Vec3::ONE,
            4,
            Mat4::IDENTITY,
        );

        assert_eq!(uniform.view_projection, projection * view);
        assert_eq!(uniform.camera_position, Vec4::new(0.0, 0.0, 5.0, 1.0));
        assert_eq!(uniform.render_mode, 4);
        assert_eq!(bytemuck::bytes_of(&uniform).len(), 320);
    }

    #[test]
    fn test_post_params() {
        assert_eq!(PostParams::SIZE, 16);
        assert_eq!(PostParams::new(true).mosaic, 1);
        assert_eq!(PostParams::new(false), PostParams::default());
    }
}
