//! Input handling for keyboard and mouse.
//!
//! [`InputState`] accumulates window events as they arrive. Once per tick
//! the application calls [`InputState::snapshot`], which returns an
//! [`InputFrame`] describing that tick and clears the per-tick state.

use std::collections::HashSet;

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Input observed during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    /// Keys held at the end of the tick.
    pub held: HashSet<KeyCode>,
    /// Keys that went down during the tick.
    pub pressed: HashSet<KeyCode>,
    /// Mouse buttons that went down during the tick.
    pub buttons_pressed: HashSet<MouseButton>,
    /// Cursor movement in pixels accumulated over the tick.
    pub mouse_delta: (f32, f32),
}

impl InputFrame {
    #[inline]
    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    #[inline]
    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    #[inline]
    pub fn was_button_pressed(&self, button: MouseButton) -> bool {
        self.buttons_pressed.contains(&button)
    }
}

/// Tracks keyboard and mouse state between ticks.
#[derive(Debug, Default)]
pub struct InputState {
    held_keys: HashSet<KeyCode>,
    pressed_keys: HashSet<KeyCode>,
    held_buttons: HashSet<MouseButton>,
    pressed_buttons: HashSet<MouseButton>,
    last_cursor: Option<(f32, f32)>,
    mouse_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one window event. Returns whether it was an input event.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.on_key_pressed(key),
                        ElementState::Released => self.on_key_released(key),
                    }
                }
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => self.on_mouse_pressed((*button).into()),
                    ElementState::Released => self.on_mouse_released((*button).into()),
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.on_cursor_moved(position.x as f32, position.y as f32);
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.last_cursor = None;
                true
            }
            WindowEvent::Focused(false) => {
                self.held_keys.clear();
                self.held_buttons.clear();
                false
            }
            _ => false,
        }
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        // Auto-repeat produces presses for held keys; those are not new presses.
        if self.held_keys.insert(key) {
            self.pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.held_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.held_buttons.insert(button) {
            self.pressed_buttons.insert(button);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.held_buttons.remove(&button);
    }

    /// Accumulates movement relative to the previous cursor position. The
    /// first position after the cursor enters the window only sets the
    /// reference point.
    pub fn on_cursor_moved(&mut self, x: f32, y: f32) {
        if let Some((last_x, last_y)) = self.last_cursor {
            self.mouse_delta.0 += x - last_x;
            self.mouse_delta.1 += y - last_y;
        }
        self.last_cursor = Some((x, y));
    }

    /// Returns this tick's input and starts a new tick.
    pub fn snapshot(&mut self) -> InputFrame {
        InputFrame {
            held: self.held_keys.clone(),
            pressed: std::mem::take(&mut self.pressed_keys),
            buttons_pressed: std::mem::take(&mut self.pressed_buttons),
            mouse_delta: std::mem::take(&mut self.mouse_delta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_is_reported_once() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.on_key_pressed(KeyCode::KeyW);

        let frame = input.snapshot();
        assert!(frame.was_pressed(KeyCode::KeyW));
        assert!(frame.is_held(KeyCode::KeyW));

        let frame = input.snapshot();
        assert!(!frame.was_pressed(KeyCode::KeyW));
        assert!(frame.is_held(KeyCode::KeyW));
    }

    #[test]
    fn test_press_and_release_within_one_tick() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Digit5);
        input.on_key_released(KeyCode::Digit5);

        let frame = input.snapshot();
        assert!(frame.was_pressed(KeyCode::Digit5));
        assert!(!frame.is_held(KeyCode::Digit5));
    }

    #[test]
    fn test_mouse_delta_accumulates_and_resets() {
        let mut input = InputState::new();
        input.on_cursor_moved(100.0, 100.0);
        input.on_cursor_moved(110.0, 95.0);
        input.on_cursor_moved(115.0, 90.0);

        let frame = input.snapshot();
        assert_eq!(frame.mouse_delta, (15.0, -10.0));
        assert_eq!(input.snapshot().mouse_delta, (0.0, 0.0));
    }

    #[test]
    fn test_mouse_buttons() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Right);
        assert!(input.snapshot().was_button_pressed(MouseButton::Right));

        input.on_mouse_released(MouseButton::Right);
        input.on_mouse_pressed(MouseButton::Right);
        assert!(input.snapshot().was_button_pressed(MouseButton::Right));
        assert!(!input.snapshot().was_button_pressed(MouseButton::Right));
    }

    #[test]
    fn test_mouse_button_conversion() {
        assert_eq!(
            MouseButton::from(winit::event::MouseButton::Right),
            MouseButton::Right
        );
        assert_eq!(
            MouseButton::from(winit::event::MouseButton::Back),
            MouseButton::Other
        );
    }
}
