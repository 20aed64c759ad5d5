//! Sampled RGBA8 textures uploaded through a staging buffer.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{BufferUsage, GpuBuffer};
use crate::command::{CommandBuffer, CommandEncoder, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{ImageDesc, ImageWithView, mip_level_count};
use crate::sync::ImageBarrier;

/// Pixel value of the placeholder texture.
pub const PLACEHOLDER_PIXEL: [u8; 4] = [128, 128, 128, 255];

/// A shader-readable texture with a full mip chain.
pub struct Texture {
    image: ImageWithView,
}

impl Texture {
    /// Uploads tightly packed RGBA8 `pixels` and generates all mip levels.
    ///
    /// `srgb` selects `R8G8B8A8_SRGB` (display-encoded colour) over
    /// `R8G8B8A8_UNORM` (linear data such as metal/roughness).
    pub fn from_rgba8(
        device: &Arc<Device>,
        pool: &CommandPool,
        name: &'static str,
        width: u32,
        height: u32,
        pixels: &[u8],
        srgb: bool,
    ) -> RhiResult<Self> {
        check_rgba8(name, width, height, pixels.len())?;

        let format = if srgb {
            vk::Format::R8G8B8A8_SRGB
        } else {
            vk::Format::R8G8B8A8_UNORM
        };
        let extent = vk::Extent2D { width, height };
        let mip_levels = mip_level_count(width, height);

        let image = ImageWithView::new(
            device,
            ImageDesc {
                name,
                extent,
                format,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                mip_levels,
            },
        )?;

        let staging = GpuBuffer::new_with_data(device, BufferUsage::Staging, pixels)?;
        pool.submit_and_wait(|cmd| {
            record_upload(cmd, staging.handle(), image.image(), extent, mip_levels);
            Ok(())
        })?;

        debug!(
            "Uploaded texture '{}' {}x{} {:?}, {} mip level(s)",
            name, width, height, format, mip_levels
        );
        Ok(Self { image })
    }

    /// The 1×1 neutral grey texture used for missing material channels.
    pub fn placeholder(device: &Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        Self::from_rgba8(device, pool, "placeholder", 1, 1, &PLACEHOLDER_PIXEL, false)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }
}

/// Copy into level 0, then blit each level from the previous one. Every
/// level ends in `SHADER_READ_ONLY_OPTIMAL`.
fn record_upload(
    cmd: &mut CommandBuffer,
    staging: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
    mip_levels: u32,
) {
    cmd.image_barriers(&[ImageBarrier::color(
        image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )]);
    cmd.copy_buffer_to_image(staging, image, extent);

    let mut level_extent = extent;
    for level in 1..mip_levels {
        cmd.image_barriers(&[ImageBarrier::color(
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .mip_range(level - 1, 1)]);
        cmd.blit_mip(image, level, level_extent);
        cmd.image_barriers(&[ImageBarrier::color(
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .mip_range(level - 1, 1)]);

        level_extent = vk::Extent2D {
            width: (level_extent.width / 2).max(1),
            height: (level_extent.height / 2).max(1),
        };
    }

    cmd.image_barriers(&[ImageBarrier::color(
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )
    .mip_range(mip_levels - 1, 1)]);
}

/// Rejects empty images and pixel data that does not match the size.
fn check_rgba8(name: &str, width: u32, height: u32, len: usize) -> RhiResult<()> {
    if width == 0 || height == 0 {
        return Err(RhiError::InvalidArgument(format!(
            "texture '{}' has no area ({}x{})",
            name, width, height
        )));
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(RhiError::InvalidArgument(format!(
            "texture '{}' is {}x{} but has {} bytes (expected {})",
            name, width, height, len, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_rgba8_rejects_zero_extent() {
        for (width, height) in [(0, 0), (0, 4), (4, 0)] {
            assert!(matches!(
                check_rgba8("empty", width, height, 0),
                Err(RhiError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_check_rgba8_size() {
        assert!(check_rgba8("ok", 2, 3, 24).is_ok());
        assert!(matches!(
            check_rgba8("short", 2, 3, 23),
            Err(RhiError::InvalidArgument(_))
        ));
    }
}
