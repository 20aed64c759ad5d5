//! Scene data consumed by the renderer.
//!
//! This crate provides:
//! - The immutable [`SceneModel`]: textures, materials, meshes and a
//!   flattened instance list
//! - Structural validation of a scene
//! - A procedurally generated demo scene

mod error;
pub mod material;
pub mod model;
pub mod procedural;

pub use error::{SceneError, SceneResult};
pub use material::{AlphaMode, Material};
pub use model::{ColorSpace, Mesh, MeshInstance, SceneModel, TextureData};
pub use procedural::demo_scene;
