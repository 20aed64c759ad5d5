//! Window management using winit.
//!
//! This module provides window creation and Vulkan surface creation.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use lumen_rhi::instance::Instance;
use lumen_rhi::surface::Surface;
use lumen_rhi::{RhiError, RhiResult, VkResultExt};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use lumen_core::{Error, Result, WindowConfig};

/// A window wrapper that provides access to the underlying winit window
/// and raw handles for Vulkan surface creation.
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Create a window as configured.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", config.width, config.height);

        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Get a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// The current drawable size in pixels. Zero while minimized.
    pub fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to present to this window.
    ///
    /// The pointers refer to static strings owned by `ash_window`.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| {
                Error::Vulkan(format!("Failed to enumerate required extensions: {}", e))
            })?;

        tracing::debug!(
            "Required Vulkan extensions for surface: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns pointers to static, NUL-terminated names.
                .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions.to_vec())
    }

    /// Create a Vulkan surface for this window.
    ///
    /// The surface keeps `instance` alive and is destroyed when the last
    /// reference to it is dropped.
    pub fn create_surface(&self, instance: &Arc<Instance>) -> RhiResult<Arc<Surface>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::Surface(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| RhiError::Surface(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: The instance was created with the extensions returned by
        // `required_extensions` and outlives the surface through the Arc.
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .context("vkCreateSurfaceKHR")?;

        tracing::info!("Vulkan surface created");

        Ok(Arc::new(Surface::from_raw(instance.clone(), handle)))
    }
}
