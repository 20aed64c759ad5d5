//! Viewer-side scene state.
//!
//! This crate provides:
//! - A fly camera and the per-tick viewer state (render mode, mosaic
//!   toggle, close request) driven by input snapshots
//! - The fixed shadow-casting light

pub mod camera;
pub mod light;

pub use camera::{FlyCamera, ViewerState, vulkan_perspective};
pub use light::ShadowLight;
