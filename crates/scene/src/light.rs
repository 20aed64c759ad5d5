//! The shadow-casting point light.

use glam::{Mat4, Vec3};
use lumen_core::LightConfig;

use crate::camera::vulkan_perspective;

/// A light with a fixed position and a fixed perspective frustum used to
/// render the shadow map.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowLight {
    pub position: Vec3,
    pub color: Vec3,
    pub target: Vec3,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl ShadowLight {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    /// Square frustum, since the shadow map is square.
    pub fn projection_matrix(&self) -> Mat4 {
        vulkan_perspective(self.fov_degrees.to_radians(), 1.0, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

impl From<&LightConfig> for ShadowLight {
    fn from(config: &LightConfig) -> Self {
        Self {
            position: Vec3::from_array(config.position),
            color: Vec3::from_array(config.color),
            target: Vec3::from_array(config.target),
            fov_degrees: config.fov_degrees,
            near: config.near,
            far: config.far,
        }
    }
}

impl Default for ShadowLight {
    fn default() -> Self {
        Self::from(&LightConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_light_matches_config() {
        let light = ShadowLight::default();
        assert_eq!(light.position, Vec3::new(1.4418, 6.4484, 0.8148));
        assert_eq!(light.fov_degrees, 90.0);
        assert_eq!(light.far, 200.0);
    }

    #[test]
    fn test_target_projects_to_center() {
        let light = ShadowLight::default();
        let clip = light.view_projection() * light.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-3);
        assert!(ndc.y.abs() < 1e-3);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn test_points_behind_light_are_outside() {
        let light = ShadowLight::default();
        let behind = light.position + (light.position - light.target).normalize();
        let clip = light.view_projection() * behind.extend(1.0);
        assert!(clip.w < 0.0);
    }
}
