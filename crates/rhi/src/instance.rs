//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and the debug
//! messenger that forwards validation output to `tracing`.

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::handle::OwnedHandle;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance with optional validation support.
///
/// Fields are released in declaration order: messenger, instance, then the
/// loaded library.
pub struct Instance {
    debug_messenger: OwnedHandle<vk::DebugUtilsMessengerEXT, ash::ext::debug_utils::Instance>,
    /// Dispatch table for instance-level calls. `_owner` destroys the same handle.
    raw: ash::Instance,
    _owner: OwnedHandle<ash::Instance, ()>,
    entry: Entry,
}

impl Instance {
    /// Creates a new Vulkan 1.3 instance.
    ///
    /// `surface_extensions` are the platform surface extensions the window
    /// system needs; they must all be available.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded, a required
    /// extension is missing, or instance creation fails.
    pub fn new(
        application_name: &CStr,
        enable_validation: bool,
        surface_extensions: &[*const c_char],
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let mut extensions = surface_extensions.to_vec();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        Self::check_extensions(&entry, &extensions)?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(application_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"lumen")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let raw = unsafe { entry.create_instance(&create_info, None) }.context("vkCreateInstance")?;
        let _owner = OwnedHandle::new((), raw.clone());
        info!("Vulkan instance created (API version 1.3)");

        let debug_messenger = if validation_available {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &raw);
            let messenger = Self::create_debug_messenger(&loader)?;
            info!("Validation layers enabled");
            OwnedHandle::new(loader, messenger)
        } else {
            OwnedHandle::empty()
        };

        Ok(Self {
            debug_messenger,
            raw,
            _owner,
            entry,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.raw
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        !self.debug_messenger.is_empty()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .context("vkEnumerateInstanceLayerProperties")?;

        Ok(layers.iter().any(|layer| {
            layer.layer_name_as_c_str().ok() == Some(VALIDATION_LAYER_NAME)
        }))
    }

    fn check_extensions(entry: &Entry, required: &[*const c_char]) -> RhiResult<()> {
        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .context("vkEnumerateInstanceExtensionProperties")?;

        for &name in required {
            let name = unsafe { CStr::from_ptr(name) };
            let found = available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().ok() == Some(name));
            if !found {
                return Err(RhiError::MissingExtension(name.to_string_lossy().into_owned()));
            }
            debug!("Instance extension enabled: {:?}", name);
        }
        Ok(())
    }

    fn create_debug_messenger(
        loader: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .context("vkCreateDebugUtilsMessengerEXT")
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        info!("Destroying Vulkan instance");
    }
}

/// Maps a message type to the label used in log lines.
fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    }
}

/// Forwards validation layer messages to `tracing` at the matching level.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid (or null) callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };
    let label = message_type_label(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", label, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[Vulkan {}] {}", label, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!("[Vulkan {}] {}", label, message),
        _ => trace!("[Vulkan {}] {}", label, message),
    }

    vk::FALSE
}
