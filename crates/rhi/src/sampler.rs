//! Texture samplers.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::{RhiResult, VkResultExt};
use crate::handle::DeviceHandle;

/// The fixed sampler configurations the renderer uses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SamplerKind {
    /// Trilinear, repeating, anisotropic.
    Material { max_anisotropy: f32 },
    /// Like `Material` but without anisotropy, so mip selection is visible.
    Debug,
    /// Linear, clamped to edge; for full-screen passes.
    PostProcess,
    /// Depth-compare sampler for the shadow map (`LESS`, opaque white border).
    Shadow,
}

impl SamplerKind {
    pub fn create_info(self) -> vk::SamplerCreateInfo<'static> {
        let base = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        match self {
            SamplerKind::Material { max_anisotropy } => base
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT)
                .anisotropy_enable(true)
                .max_anisotropy(max_anisotropy),
            SamplerKind::Debug => base
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT),
            SamplerKind::PostProcess => base
                .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE),
            SamplerKind::Shadow => base
                .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
                .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
                .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
                .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
                .compare_enable(true)
                .compare_op(vk::CompareOp::LESS),
        }
    }
}

pub struct Sampler {
    sampler: DeviceHandle<vk::Sampler>,
    kind: SamplerKind,
}

impl Sampler {
    pub fn new(device: &Arc<Device>, kind: SamplerKind) -> RhiResult<Self> {
        let create_info = kind.create_info();
        let sampler = unsafe { device.handle().create_sampler(&create_info, None) }
            .context("vkCreateSampler")?;
        Ok(Self {
            sampler: DeviceHandle::new(device.clone(), sampler),
            kind,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn kind(&self) -> SamplerKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_sampler_is_anisotropic() {
        let info = SamplerKind::Material {
            max_anisotropy: 16.0,
        }
        .create_info();
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
    }

    #[test]
    fn test_debug_sampler_has_no_anisotropy() {
        let info = SamplerKind::Debug.create_info();
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
    }

    #[test]
    fn test_shadow_sampler_compares() {
        let info = SamplerKind::Shadow.create_info();
        assert_eq!(info.compare_enable, vk::TRUE);
        assert_eq!(info.compare_op, vk::CompareOp::LESS);
        assert_eq!(info.border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_BORDER);
    }

    #[test]
    fn test_post_sampler_clamps() {
        let info = SamplerKind::PostProcess.create_info();
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.compare_enable, vk::FALSE);
    }
}
