//! GPU images and image views.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::DeviceHandle;

/// Number of levels in a full mip chain for a `width` × `height` image.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Aspect implied by a format.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Parameters of a 2D device-local image.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
}

/// A 2D image with its memory.
pub struct GpuImage {
    image: DeviceHandle<vk::Image>,
    allocation: DeviceHandle<Allocation>,
    desc: ImageDesc,
}

impl GpuImage {
    pub fn new(device: &Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "image '{}' has zero extent",
                desc.name
            )));
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None) }
            .context("vkCreateImage")?;
        let image = DeviceHandle::new(device.clone(), image);

        let requirements = unsafe { device.handle().get_image_memory_requirements(image.handle()) };
        let allocation = device.allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        let allocation = DeviceHandle::new(device.clone(), allocation);

        if let Some(memory) = allocation.get() {
            unsafe {
                device
                    .handle()
                    .bind_image_memory(image.handle(), memory.memory(), memory.offset())
            }
            .context("vkBindImageMemory")?;
        }

        debug!(
            "Created image '{}' {}x{} {:?} ({} mip level(s))",
            desc.name, desc.extent.width, desc.extent.height, desc.format, desc.mip_levels
        );

        Ok(Self {
            image,
            allocation,
            desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }
}

/// Creates a 2D view over all `mip_levels` of `image`.
pub fn create_image_view(
    device: &Arc<Device>,
    image: vk::Image,
    format: vk::Format,
    mip_levels: u32,
) -> RhiResult<DeviceHandle<vk::ImageView>> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_for_format(format))
                .base_mip_level(0)
                .level_count(mip_levels)
                .base_array_layer(0)
                .layer_count(1),
        );
    let view = unsafe { device.handle().create_image_view(&create_info, None) }
        .context("vkCreateImageView")?;
    Ok(DeviceHandle::new(device.clone(), view))
}

/// An image together with a view covering all of it.
///
/// The view is declared first so it is destroyed before the image.
pub struct ImageWithView {
    view: DeviceHandle<vk::ImageView>,
    image: GpuImage,
}

impl ImageWithView {
    pub fn new(device: &Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        let image = GpuImage::new(device, desc)?;
        let view = create_image_view(device, image.handle(), desc.format, desc.mip_levels)?;
        Ok(Self { view, image })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.desc().mip_levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(1000, 3), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
        assert!(aspect_for_format(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}
