//! Error types for scene validation.

use thiserror::Error;

/// A structural problem in a [`SceneModel`](crate::SceneModel).
///
/// Bad material or texture references are not errors; the renderer
/// substitutes defaults for those.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A mesh has no vertices or no indices.
    #[error("Mesh {mesh} is empty")]
    EmptyMesh { mesh: usize },

    /// A vertex attribute array differs in length from the positions.
    #[error("Mesh {mesh}: {attribute} has {actual} entries, expected {expected}")]
    AttributeLength {
        mesh: usize,
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The index count is not a multiple of three.
    #[error("Mesh {mesh}: {count} indices do not form whole triangles")]
    PartialTriangle { mesh: usize, count: usize },

    /// An index refers past the end of the vertex arrays.
    #[error("Mesh {mesh}: index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        mesh: usize,
        index: u32,
        vertex_count: usize,
    },

    /// An instance refers to a mesh that does not exist.
    #[error("Instance {instance}: mesh {mesh} out of range ({mesh_count} meshes)")]
    MeshOutOfRange {
        instance: usize,
        mesh: usize,
        mesh_count: usize,
    },

    /// A texture with zero width or height.
    #[error("Texture '{name}' is empty ({width}x{height})")]
    TextureEmpty { name: String, width: u32, height: u32 },

    /// Pixel data does not match the declared size.
    #[error("Texture '{name}': {actual} bytes, expected {expected} for RGBA8")]
    TextureSize {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
