//! Platform abstraction layer for the lumen renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Vulkan surface creation for a window
//! - Input accumulation (keyboard, mouse) into per-tick snapshots

mod input;
mod window;

pub use input::{InputFrame, InputState, KeyCode, MouseButton};
pub use window::Window;

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
