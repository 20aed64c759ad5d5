//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition,
//! presentation and recreation.
//!
//! Recreation is atomic: the replacement is built while the current
//! swapchain is still intact (and passed as `oldSwapchain`), and only once
//! that succeeds is the old one released. A failed recreation leaves the
//! previous handle, images and views untouched.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::{DeviceHandle, OwnedHandle};
use crate::image::create_image_view;
use crate::surface::Surface;

/// Result of asking the swapchain for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { image_index: u32 },
    /// Suboptimal or out of date; the swapchain must be recreated.
    Invalidated,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The image was queued (or dropped) but the swapchain must be recreated.
    Invalidated,
}

/// Maps the raw acquire result. Only surface-change codes are absorbed.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((image_index, false)) => Ok(AcquireOutcome::Ready { image_index }),
        Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Invalidated),
        Err(result) => Err(RhiError::Vk {
            call: "vkAcquireNextImageKHR",
            result,
        }),
    }
}

/// Maps the raw present result. Only surface-change codes are absorbed.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Invalidated),
        Err(result) => Err(RhiError::Vk {
            call: "vkQueuePresentKHR",
            result,
        }),
    }
}

/// What differs between a recreated swapchain and its predecessor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapchainChanges {
    pub extent_changed: bool,
    pub format_changed: bool,
    pub image_count_changed: bool,
}

/// Builds a replacement for `current` and swaps it in.
///
/// `build` sees the current value (e.g. to pass the old handle along). On
/// error `current` is left as it was; on success the previous value is
/// returned so the caller decides when it is released.
pub fn replace_atomically<T, E>(
    current: &mut T,
    build: impl FnOnce(&T) -> Result<T, E>,
) -> Result<T, E> {
    let replacement = build(current)?;
    Ok(std::mem::replace(current, replacement))
}

/// Chooses the surface format.
///
/// Prefers an 8-bit sRGB format with the sRGB non-linear colour space,
/// otherwise takes the first reported format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    const PREFERRED: [vk::Format; 2] = [vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB];

    formats
        .iter()
        .find(|f| {
            PREFERRED.contains(&f.format) && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| {
            let first = formats.first();
            if let Some(first) = first {
                warn!("No sRGB surface format, using {:?}", first.format);
            }
            first
        })
        .copied()
}

/// Prefers relaxed FIFO; plain FIFO is always available.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::FIFO_RELAXED) {
        vk::PresentModeKHR::FIFO_RELAXED
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the window size clamped into the
/// supported range when the surface leaves it undefined (`u32::MAX`).
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `clamp(min + 1, min, max)`, where a `max` of 0 means unbounded.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.clamp(capabilities.min_image_count, capabilities.max_image_count)
    } else {
        preferred
    }
}

/// One swapchain instance: the handle, its images and one view per image.
///
/// Views are declared before the handle so they are destroyed first. The
/// images belong to the swapchain and are never destroyed individually.
struct SwapchainState {
    views: Vec<DeviceHandle<vk::ImageView>>,
    swapchain: OwnedHandle<vk::SwapchainKHR, ash::khr::swapchain::Device>,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl SwapchainState {
    fn create(
        device: &Arc<Device>,
        loader: &ash::khr::swapchain::Device,
        surface: &Surface,
        window: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let physical = device.physical().device;
        let capabilities = surface.capabilities(physical)?;
        let formats = surface.formats(physical)?;
        let present_modes = surface.present_modes(physical)?;

        let format = choose_surface_format(&formats)
            .ok_or_else(|| RhiError::Swapchain("surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&capabilities, window);
        let image_count = determine_image_count(&capabilities);

        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::Swapchain("surface extent is zero".to_string()));
        }

        let families = device.queue_families();
        let family_indices = families.unique_families();
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        let create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .context("vkCreateSwapchainKHR")?;
        let swapchain = OwnedHandle::new(loader.clone(), handle);

        let images = unsafe { loader.get_swapchain_images(handle) }
            .context("vkGetSwapchainImagesKHR")?;
        let views = images
            .iter()
            .map(|&image| create_image_view(device, image, format.format, 1))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} image(s)",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            images.len()
        );

        Ok(Self {
            views,
            swapchain,
            images,
            format,
            extent,
            present_mode,
        })
    }
}

/// Vulkan swapchain wrapper.
pub struct Swapchain {
    state: SwapchainState,
    loader: ash::khr::swapchain::Device,
    device: Arc<Device>,
    surface: Arc<Surface>,
}

impl Swapchain {
    pub fn new(device: &Arc<Device>, surface: Arc<Surface>, window: vk::Extent2D) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(device.instance().handle(), device.handle());
        let state = SwapchainState::create(
            device,
            &loader,
            &surface,
            window,
            vk::SwapchainKHR::null(),
        )?;
        Ok(Self {
            state,
            loader,
            device: device.clone(),
            surface,
        })
    }

    /// Rebuilds the swapchain for a new window size.
    ///
    /// The caller must make sure the device is idle. On error the current
    /// swapchain stays valid.
    pub fn recreate(&mut self, window: vk::Extent2D) -> RhiResult<SwapchainChanges> {
        let previous = replace_atomically(&mut self.state, |current| {
            SwapchainState::create(
                &self.device,
                &self.loader,
                &self.surface,
                window,
                current.swapchain.handle(),
            )
        })?;

        let changes = SwapchainChanges {
            extent_changed: previous.extent != self.state.extent,
            format_changed: previous.format.format != self.state.format.format,
            image_count_changed: previous.images.len() != self.state.images.len(),
        };
        drop(previous);
        debug!("Swapchain recreated: {:?}", changes);
        Ok(changes)
    }

    /// Acquires the next image, signalling `semaphore` when it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        classify_acquire(unsafe {
            self.loader.acquire_next_image(
                self.state.swapchain.handle(),
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<PresentOutcome> {
        let swapchains = [self.state.swapchain.handle()];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe {
            self.loader
                .queue_present(self.device.present_queue(), &present_info)
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.state.swapchain.handle()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.state.format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.state.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.state.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.state.images.len()
    }

    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.state.images[index]
    }

    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.state.views[index].handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::handle::Destroy;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );

        let formats = [
            surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
            surface_format(vk::Format::R8G8B8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_SRGB)
        );
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_UNORM),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_UNORM)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::FIFO_RELAXED,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO_RELAXED);

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(extent, vk::Extent2D { width: 1920, height: 1080 });
    }

    #[test]
    fn test_undefined_extent_uses_clamped_window_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(extent, vk::Extent2D { width: 1024, height: 720 });

        let extent = choose_extent(&capabilities, vk::Extent2D { width: 50, height: 50 });
        assert_eq!(extent, vk::Extent2D { width: 100, height: 100 });
    }

    #[test]
    fn test_determine_image_count() {
        assert_eq!(determine_image_count(&caps(2, 3)), 3);
        assert_eq!(determine_image_count(&caps(2, 2)), 2);
        assert_eq!(determine_image_count(&caps(2, 8)), 3);
        assert_eq!(determine_image_count(&caps(2, 0)), 3);
        assert_eq!(determine_image_count(&caps(3, 0)), 4);
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Ready { image_index: 2 }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Invalidated
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::Invalidated
        );
        match classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)) {
            Err(RhiError::Vk { call, result }) => {
                assert_eq!(call, "vkAcquireNextImageKHR");
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Invalidated);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Invalidated
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    type Log = Rc<RefCell<Vec<u64>>>;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct FakeHandle(u64);

    impl Destroy<Log> for FakeHandle {
        fn destroy(self, log: &Log) {
            log.borrow_mut().push(self.0);
        }
    }

    struct FakeState {
        views: Vec<OwnedHandle<FakeHandle, Log>>,
        swapchain: OwnedHandle<FakeHandle, Log>,
    }

    fn fake_state(log: &Log, swapchain: u64, views: &[u64]) -> FakeState {
        FakeState {
            views: views
                .iter()
                .map(|&id| OwnedHandle::new(log.clone(), FakeHandle(id)))
                .collect(),
            swapchain: OwnedHandle::new(log.clone(), FakeHandle(swapchain)),
        }
    }

    #[test]
    fn test_failed_recreation_keeps_previous_state() {
        let log = Log::default();
        let mut state = fake_state(&log, 1, &[10, 11, 12]);

        let result = replace_atomically(&mut state, |_| -> Result<FakeState, &str> {
            Err("surface lost")
        });

        assert_eq!(result.err(), Some("surface lost"));
        assert!(log.borrow().is_empty());
        assert_eq!(state.swapchain.handle(), FakeHandle(1));
        let views: Vec<_> = state.views.iter().map(|v| v.handle()).collect();
        assert_eq!(views, vec![FakeHandle(10), FakeHandle(11), FakeHandle(12)]);
    }

    #[test]
    fn test_successful_recreation_releases_old_after_new_exists() {
        let log = Log::default();
        let mut state = fake_state(&log, 1, &[10, 11]);

        let previous = replace_atomically(&mut state, |current| -> Result<FakeState, ()> {
            // The old handle is still alive while the new one is built.
            assert_eq!(current.swapchain.handle(), FakeHandle(1));
            Ok(fake_state(&log, 2, &[20, 21, 22]))
        })
        .unwrap();

        assert!(log.borrow().is_empty());
        assert_eq!(state.swapchain.handle(), FakeHandle(2));
        assert_eq!(state.views.len(), 3);

        drop(previous);
        assert_eq!(*log.borrow(), vec![10, 11, 1]);
    }
}
