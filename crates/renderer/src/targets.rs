//! Off-screen render targets.
//!
//! The extent-dependent targets (depth, HDR colour, visualisation colour)
//! are rebuilt whenever the swapchain extent changes. The shadow map has a
//! fixed resolution and lives for the whole run.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use lumen_rhi::RhiResult;
use lumen_rhi::device::Device;
use lumen_rhi::image::{ImageDesc, ImageWithView};

/// Scene depth buffer format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Shadow map format.
pub const SHADOW_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Primary off-screen colour target.
pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Overdraw/overshading visualisation target.
pub const VIS_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

fn color_target_desc(name: &'static str, extent: vk::Extent2D, format: vk::Format) -> ImageDesc {
    ImageDesc {
        name,
        extent,
        format,
        usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        mip_levels: 1,
    }
}

fn depth_target_desc(name: &'static str, extent: vk::Extent2D, format: vk::Format) -> ImageDesc {
    ImageDesc {
        name,
        extent,
        format,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        mip_levels: 1,
    }
}

/// Targets sized to the swapchain.
pub struct RenderTargets {
    hdr: ImageWithView,
    visualization: ImageWithView,
    depth: ImageWithView,
}

impl RenderTargets {
    pub fn new(device: &Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        let hdr = ImageWithView::new(device, color_target_desc("hdr target", extent, HDR_FORMAT))?;
        let visualization =
            ImageWithView::new(device, color_target_desc("vis target", extent, VIS_FORMAT))?;
        let depth = ImageWithView::new(device, depth_target_desc("depth buffer", extent, DEPTH_FORMAT))?;

        debug!(
            "Created render targets {}x{}",
            extent.width, extent.height
        );
        Ok(Self {
            hdr,
            visualization,
            depth,
        })
    }

    #[inline]
    pub fn hdr(&self) -> &ImageWithView {
        &self.hdr
    }

    #[inline]
    pub fn visualization(&self) -> &ImageWithView {
        &self.visualization
    }

    #[inline]
    pub fn depth(&self) -> &ImageWithView {
        &self.depth
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.hdr.extent()
    }
}

/// Square depth-only target rendered from the light.
pub struct ShadowMap {
    image: ImageWithView,
}

impl ShadowMap {
    pub fn new(device: &Arc<Device>, resolution: u32) -> RhiResult<Self> {
        let extent = vk::Extent2D {
            width: resolution,
            height: resolution,
        };
        let image = ImageWithView::new(device, depth_target_desc("shadow map", extent, SHADOW_FORMAT))?;
        debug!("Created shadow map {}x{}", resolution, resolution);
        Ok(Self { image })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.image()
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_targets_are_sampled_attachments() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let desc = color_target_desc("t", extent, HDR_FORMAT);
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(desc.extent, extent);
        assert_eq!(desc.mip_levels, 1);
    }

    #[test]
    fn test_depth_targets_are_sampled_attachments() {
        let extent = vk::Extent2D {
            width: 2048,
            height: 2048,
        };
        let desc = depth_target_desc("t", extent, SHADOW_FORMAT);
        assert!(desc.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
    }

    #[test]
    fn test_target_formats() {
        assert_eq!(DEPTH_FORMAT, vk::Format::D32_SFLOAT);
        assert_eq!(HDR_FORMAT, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(VIS_FORMAT, vk::Format::R8G8B8A8_UNORM);
    }
}
