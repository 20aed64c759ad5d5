//! Material definitions.

use glam::Vec4;

/// How a material treats base-colour alpha.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Fragments with alpha below `cutoff` are discarded.
    Mask { cutoff: f32 },
    /// Alpha blending; drawn like opaque geometry by this renderer.
    Blend,
}

/// PBR material as produced by the asset loader.
///
/// Texture slots are indices into [`SceneModel::textures`](crate::SceneModel);
/// `None` means the channel is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    /// Roughness in G, metalness in B.
    pub metal_rough_texture: Option<usize>,
    pub alpha_mask_texture: Option<usize>,
    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub alpha_mode: AlphaMode,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_texture: None,
            normal_texture: None,
            metal_rough_texture: None,
            alpha_mask_texture: None,
            base_color_factor: Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            alpha_mode: AlphaMode::Opaque,
        }
    }
}

impl Material {
    /// Whether draws with this material go through the alpha-tested path.
    #[inline]
    pub fn is_alpha_masked(&self) -> bool {
        matches!(self.alpha_mode, AlphaMode::Mask { .. })
    }
}
