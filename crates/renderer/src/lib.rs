//! Frame orchestration for the lumen renderer.
//!
//! This crate turns the device layer in `lumen-rhi` into a renderer:
//! - Binding layouts, material sets and per-slot post-process sets
//! - Off-screen render targets and the shadow map
//! - The pipeline set and the render-mode table
//! - The frame scheduler (slot ring, fence gating, swapchain rebuilds)
//! - Per-frame command recording (upload, shadow, main, resolve)

mod error;

pub mod bindings;
pub mod passes;
pub mod pipelines;
pub mod renderer;
pub mod scene_gpu;
pub mod scheduler;
pub mod targets;
pub mod uniforms;

pub use error::{RendererError, RendererResult};
pub use pipelines::RenderMode;
pub use renderer::Renderer;
pub use scheduler::{FrameScheduler, FrameState, TickOutcome};
