//! Vertex input layouts.
//!
//! Mesh attributes live in separate, tightly packed buffers (one per
//! attribute), so every attribute gets its own binding.
//!
//! - [`VertexStream`] names one attribute buffer
//! - [`VertexLayout`] is an ordered list of streams; stream `i` is bound at
//!   binding `i` and read at location `i`

use ash::vk;
use glam::{Vec2, Vec3};

/// One per-vertex attribute buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexStream {
    Position,
    TexCoord,
    Normal,
}

impl VertexStream {
    pub const fn format(self) -> vk::Format {
        match self {
            VertexStream::Position | VertexStream::Normal => vk::Format::R32G32B32_SFLOAT,
            VertexStream::TexCoord => vk::Format::R32G32_SFLOAT,
        }
    }

    pub const fn stride(self) -> u32 {
        match self {
            VertexStream::Position | VertexStream::Normal => std::mem::size_of::<Vec3>() as u32,
            VertexStream::TexCoord => std::mem::size_of::<Vec2>() as u32,
        }
    }
}

/// The streams a pipeline consumes, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    streams: &'static [VertexStream],
}

impl VertexLayout {
    /// Position, texcoord and normal; used by every geometry pass pipeline.
    pub const MESH: Self = Self {
        streams: &[
            VertexStream::Position,
            VertexStream::TexCoord,
            VertexStream::Normal,
        ],
    };

    /// Position and texcoord; the shadow pass needs UVs for alpha masking.
    pub const SHADOW: Self = Self {
        streams: &[VertexStream::Position, VertexStream::TexCoord],
    };

    /// No vertex input; full-screen passes generate positions in the shader.
    pub const NONE: Self = Self { streams: &[] };

    #[inline]
    pub fn streams(&self) -> &'static [VertexStream] {
        self.streams
    }

    pub fn binding_descriptions(&self) -> Vec<vk::VertexInputBindingDescription> {
        self.streams
            .iter()
            .enumerate()
            .map(|(binding, stream)| vk::VertexInputBindingDescription {
                binding: binding as u32,
                stride: stream.stride(),
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect()
    }

    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.streams
            .iter()
            .enumerate()
            .map(|(index, stream)| vk::VertexInputAttributeDescription {
                location: index as u32,
                binding: index as u32,
                format: stream.format(),
                offset: 0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_strides() {
        assert_eq!(VertexStream::Position.stride(), 12);
        assert_eq!(VertexStream::TexCoord.stride(), 8);
        assert_eq!(VertexStream::Normal.stride(), 12);
    }

    #[test]
    fn test_mesh_layout() {
        let bindings = VertexLayout::MESH.binding_descriptions();
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].stride, 8);
        assert_eq!(bindings[2].stride, 12);

        let attrs = VertexLayout::MESH.attribute_descriptions();
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[2].location, 2);
        assert_eq!(attrs[2].binding, 2);
        assert!(attrs.iter().all(|a| a.offset == 0));
    }

    #[test]
    fn test_shadow_layout_uses_first_two_streams() {
        let bindings = VertexLayout::SHADOW.binding_descriptions();
        assert_eq!(bindings.len(), 2);
        assert_eq!(
            VertexLayout::SHADOW.streams(),
            &VertexLayout::MESH.streams()[..2]
        );
    }

    #[test]
    fn test_empty_layout() {
        assert!(VertexLayout::NONE.binding_descriptions().is_empty());
        assert!(VertexLayout::NONE.attribute_descriptions().is_empty());
    }
}
