//! Presentation surface.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::{RhiResult, VkResultExt};
use crate::handle::OwnedHandle;
use crate::instance::Instance;

/// A `VkSurfaceKHR` owned together with the instance it was created from.
///
/// Swapchains hold an `Arc<Surface>`, so the surface outlives every
/// swapchain built on it and the instance outlives the surface.
pub struct Surface {
    surface: OwnedHandle<vk::SurfaceKHR, ash::khr::surface::Instance>,
    loader: ash::khr::surface::Instance,
    instance: Arc<Instance>,
}

impl Surface {
    /// Takes ownership of a surface created by the window system integration.
    pub fn from_raw(instance: Arc<Instance>, surface: vk::SurfaceKHR) -> Self {
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        debug!("Surface created");
        Self {
            surface: OwnedHandle::new(loader.clone(), surface),
            loader,
            instance,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> RhiResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.handle())
        }
        .context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> RhiResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.handle())
        }
        .context("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> RhiResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.handle())
        }
        .context("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }
}
