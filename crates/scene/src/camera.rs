//! Fly camera and the per-tick viewer state.

use glam::{Mat4, Vec3};
use lumen_core::CameraConfig;
use lumen_platform::{InputFrame, KeyCode, MouseButton};
use tracing::info;

/// Perspective projection for Vulkan: right-handed, depth 0..1, Y flipped.
pub fn vulkan_perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
    proj.y_axis.y *= -1.0;
    proj
}

/// A free-flying camera driven by WASD/EQ and mouse-look.
///
/// Movement is applied in camera space; mouse yaw rotates about the world
/// up axis and pitch about the camera's own X axis.
#[derive(Clone, Debug)]
pub struct FlyCamera {
    camera_to_world: Mat4,
    config: CameraConfig,
}

impl FlyCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            camera_to_world: Mat4::IDENTITY,
            config,
        }
    }

    #[inline]
    pub fn camera_to_world(&self) -> Mat4 {
        self.camera_to_world
    }

    pub fn set_camera_to_world(&mut self, camera_to_world: Mat4) {
        self.camera_to_world = camera_to_world;
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.camera_to_world.w_axis.truncate()
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.camera_to_world.inverse()
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        vulkan_perspective(
            self.config.fov_degrees.to_radians(),
            aspect,
            self.config.near,
            self.config.far,
        )
    }

    /// Rotates by a mouse movement in pixels.
    pub fn look(&mut self, delta: (f32, f32)) {
        let yaw = -delta.0 * self.config.mouse_sensitivity;
        let pitch = -delta.1 * self.config.mouse_sensitivity;

        let position = self.camera_to_world.w_axis;
        let mut rotation = self.camera_to_world;
        rotation.w_axis = glam::Vec4::W;
        rotation = Mat4::from_rotation_y(yaw) * rotation;
        rotation.w_axis = position;

        self.camera_to_world = rotation * Mat4::from_rotation_x(pitch);
    }

    /// Translates along the held movement keys for `dt` seconds.
    pub fn fly(&mut self, input: &InputFrame, dt: f32) {
        let mut speed = self.config.base_speed * dt;
        if input.is_held(KeyCode::ShiftLeft) || input.is_held(KeyCode::ShiftRight) {
            speed *= self.config.fast_multiplier;
        }
        if input.is_held(KeyCode::ControlLeft) || input.is_held(KeyCode::ControlRight) {
            speed *= self.config.slow_multiplier;
        }

        const AXES: [(KeyCode, Vec3); 6] = [
            (KeyCode::KeyW, Vec3::NEG_Z),
            (KeyCode::KeyS, Vec3::Z),
            (KeyCode::KeyA, Vec3::NEG_X),
            (KeyCode::KeyD, Vec3::X),
            (KeyCode::KeyE, Vec3::Y),
            (KeyCode::KeyQ, Vec3::NEG_Y),
        ];
        let direction: Vec3 = AXES
            .iter()
            .filter(|(key, _)| input.is_held(*key))
            .map(|(_, axis)| *axis)
            .sum();

        if direction != Vec3::ZERO {
            self.camera_to_world *= Mat4::from_translation(direction * speed);
        }
    }
}

/// Everything the user can change interactively, updated once per tick.
#[derive(Clone, Debug)]
pub struct ViewerState {
    pub camera: FlyCamera,
    mouse_look: bool,
    render_mode: u32,
    mosaic: bool,
    close_requested: bool,
}

impl ViewerState {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            camera: FlyCamera::new(config),
            mouse_look: false,
            render_mode: 0,
            mosaic: false,
            close_requested: false,
        }
    }

    /// Applies one tick of input.
    ///
    /// Mouse movement only turns the camera while mouse-look is active and
    /// was already active at the start of the tick, so toggling it on does
    /// not apply the jump accumulated beforehand.
    pub fn update(&mut self, input: &InputFrame, dt: f32) {
        let was_looking = self.mouse_look;
        if input.was_button_pressed(MouseButton::Right) {
            self.mouse_look = !self.mouse_look;
        }
        if was_looking && self.mouse_look {
            self.camera.look(input.mouse_delta);
        }

        self.camera.fly(input, dt);

        const MODE_KEYS: [(KeyCode, u32); 6] = [
            (KeyCode::Digit1, 0),
            (KeyCode::Digit2, 1),
            (KeyCode::Digit3, 2),
            (KeyCode::Digit4, 3),
            (KeyCode::Digit6, 4),
            (KeyCode::Digit7, 5),
        ];
        for (key, mode) in MODE_KEYS {
            if input.was_pressed(key) {
                self.render_mode = mode;
            }
        }

        if input.was_pressed(KeyCode::Digit5) {
            self.mosaic = !self.mosaic;
        }
        if input.was_pressed(KeyCode::Escape) {
            self.close_requested = true;
        }
        if input.was_pressed(KeyCode::KeyP) {
            let p = self.camera.position();
            info!("Camera position: {:.4}, {:.4}, {:.4}", p.x, p.y, p.z);
        }
    }

    #[inline]
    pub fn mouse_look(&self) -> bool {
        self.mouse_look
    }

    /// Raw render-mode value as written to the scene uniform.
    #[inline]
    pub fn render_mode(&self) -> u32 {
        self.render_mode
    }

    #[inline]
    pub fn mosaic(&self) -> bool {
        self.mosaic
    }

    #[inline]
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(held: &[KeyCode], pressed: &[KeyCode]) -> InputFrame {
        InputFrame {
            held: held.iter().copied().collect(),
            pressed: pressed.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_forward_moves_along_negative_z() {
        let mut camera = FlyCamera::new(CameraConfig::default());
        camera.fly(&frame(&[KeyCode::KeyW], &[]), 1.0);
        assert_vec_eq(camera.position(), Vec3::new(0.0, 0.0, -1.7));
    }

    #[test]
    fn test_speed_modifiers() {
        let mut camera = FlyCamera::new(CameraConfig::default());
        camera.fly(&frame(&[KeyCode::KeyD, KeyCode::ShiftLeft], &[]), 1.0);
        assert_vec_eq(camera.position(), Vec3::new(8.5, 0.0, 0.0));

        let mut camera = FlyCamera::new(CameraConfig::default());
        camera.fly(&frame(&[KeyCode::KeyE, KeyCode::ControlLeft], &[]), 2.0);
        assert_vec_eq(camera.position(), Vec3::new(0.0, 0.17, 0.0));
    }

    #[test]
    fn test_yaw_keeps_position() {
        let mut camera = FlyCamera::new(CameraConfig::default());
        camera.set_camera_to_world(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        camera.look((std::f32::consts::FRAC_PI_2 / 0.01, 0.0));
        assert_vec_eq(camera.position(), Vec3::new(1.0, 2.0, 3.0));

        // Turned right by 90 degrees: forward is now +X.
        camera.fly(&frame(&[KeyCode::KeyW], &[]), 1.0);
        assert_vec_eq(camera.position(), Vec3::new(2.7, 2.0, 3.0));
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = FlyCamera::new(CameraConfig::default());
        let proj = camera.projection_matrix(16.0 / 9.0);
        assert!(proj.y_axis.y < 0.0);
        assert!(proj.x_axis.x > 0.0);
    }

    #[test]
    fn test_view_is_inverse_of_camera_to_world() {
        let mut camera = FlyCamera::new(CameraConfig::default());
        camera.set_camera_to_world(Mat4::from_translation(Vec3::new(0.0, 1.0, 5.0)));
        let origin = camera.view_matrix().transform_point3(Vec3::new(0.0, 1.0, 5.0));
        assert_vec_eq(origin, Vec3::ZERO);
    }

    #[test]
    fn test_render_mode_keys() {
        let mut viewer = ViewerState::new(CameraConfig::default());
        let cases = [
            (KeyCode::Digit2, 1),
            (KeyCode::Digit3, 2),
            (KeyCode::Digit4, 3),
            (KeyCode::Digit6, 4),
            (KeyCode::Digit7, 5),
            (KeyCode::Digit1, 0),
        ];
        for (key, mode) in cases {
            viewer.update(&frame(&[], &[key]), 0.0);
            assert_eq!(viewer.render_mode(), mode);
        }
    }

    #[test]
    fn test_mosaic_toggle_and_close() {
        let mut viewer = ViewerState::new(CameraConfig::default());
        viewer.update(&frame(&[], &[KeyCode::Digit5]), 0.0);
        assert!(viewer.mosaic());
        viewer.update(&frame(&[], &[KeyCode::Digit5]), 0.0);
        assert!(!viewer.mosaic());

        assert!(!viewer.close_requested());
        viewer.update(&frame(&[], &[KeyCode::Escape]), 0.0);
        assert!(viewer.close_requested());
    }

    #[test]
    fn test_mouse_look_toggle_skips_first_delta() {
        let mut viewer = ViewerState::new(CameraConfig::default());
        let before = viewer.camera.camera_to_world();

        let mut input = InputFrame {
            mouse_delta: (50.0, 0.0),
            ..Default::default()
        };
        input.buttons_pressed.insert(MouseButton::Right);
        viewer.update(&input, 0.0);
        assert!(viewer.mouse_look());
        assert_eq!(viewer.camera.camera_to_world(), before);

        let input = InputFrame {
            mouse_delta: (50.0, 0.0),
            ..Default::default()
        };
        viewer.update(&input, 0.0);
        assert_ne!(viewer.camera.camera_to_world(), before);
    }
}
