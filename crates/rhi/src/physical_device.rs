//! Physical device (GPU) selection.
//!
//! Selection runs in two steps: every enumerated GPU is queried into a plain
//! [`DeviceCandidate`], then [`evaluate_candidate`] either rejects it with a
//! reason or gives it a score. The highest score wins; on a tie the first
//! enumerated device is kept.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult, VkResultExt};

/// Minimum Vulkan version (dynamic rendering and synchronization2 are core).
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_3;

/// Required device extensions.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

const DISCRETE_SCORE: u32 = 500;
const INTEGRATED_SCORE: u32 = 100;

/// Queue families used by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Whether one family serves both graphics and presentation.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// The distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Capabilities of one queue family, as far as selection cares.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// Picks queue families, preferring one family with graphics and present.
///
/// Falls back to the first graphics family and the first present family.
pub fn find_queue_families(families: &[QueueFamilySupport]) -> Option<QueueFamilyIndices> {
    if let Some(shared) = families.iter().position(|f| f.graphics && f.present) {
        let shared = shared as u32;
        return Some(QueueFamilyIndices {
            graphics: shared,
            present: shared,
        });
    }

    let graphics = families.iter().position(|f| f.graphics)?;
    let present = families.iter().position(|f| f.present)?;
    Some(QueueFamilyIndices {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// Everything device selection needs to know about one GPU.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub has_swapchain_extension: bool,
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    pub sampler_anisotropy: bool,
    pub queue_families: Vec<QueueFamilySupport>,
}

/// Why a device was not considered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    ApiVersion { major: u32, minor: u32 },
    MissingExtension(&'static str),
    MissingFeature(&'static str),
    NoGraphicsQueue,
    NoPresentQueue,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiVersion { major, minor } => {
                write!(f, "Vulkan {}.{} is below the required 1.3", major, minor)
            }
            Self::MissingExtension(name) => write!(f, "missing extension {}", name),
            Self::MissingFeature(name) => write!(f, "missing feature {}", name),
            Self::NoGraphicsQueue => f.write_str("no graphics queue family"),
            Self::NoPresentQueue => f.write_str("no queue family can present to the surface"),
        }
    }
}

/// Rejects unusable devices and scores the rest.
pub fn evaluate_candidate(candidate: &DeviceCandidate) -> Result<u32, Rejection> {
    if candidate.api_version < MIN_API_VERSION {
        return Err(Rejection::ApiVersion {
            major: vk::api_version_major(candidate.api_version),
            minor: vk::api_version_minor(candidate.api_version),
        });
    }
    if !candidate.has_swapchain_extension {
        return Err(Rejection::MissingExtension("VK_KHR_swapchain"));
    }
    if !candidate.dynamic_rendering {
        return Err(Rejection::MissingFeature("dynamicRendering"));
    }
    if !candidate.synchronization2 {
        return Err(Rejection::MissingFeature("synchronization2"));
    }
    if !candidate.sampler_anisotropy {
        return Err(Rejection::MissingFeature("samplerAnisotropy"));
    }
    if !candidate.queue_families.iter().any(|f| f.graphics) {
        return Err(Rejection::NoGraphicsQueue);
    }
    if !candidate.queue_families.iter().any(|f| f.present) {
        return Err(Rejection::NoPresentQueue);
    }

    Ok(match candidate.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => DISCRETE_SCORE,
        vk::PhysicalDeviceType::INTEGRATED_GPU => INTEGRATED_SCORE,
        _ => 0,
    })
}

/// Index of the best candidate, or `None` if every candidate was rejected.
pub fn pick_best(candidates: &[DeviceCandidate]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        match evaluate_candidate(candidate) {
            Ok(score) => {
                debug!("GPU '{}' scored {}", candidate.name, score);
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((index, score));
                }
            }
            Err(reason) => debug!("GPU '{}' rejected: {}", candidate.name, reason),
        }
    }
    best.map(|(index, _)| index)
}

/// The selected GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Anisotropy used by the material sampler.
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy.min(16.0)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableDevice`] if no GPU qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.context("vkEnumeratePhysicalDevices")?;
    info!("Found {} GPU(s)", devices.len());

    let mut candidates = Vec::with_capacity(devices.len());
    for &device in &devices {
        candidates.push(query_candidate(instance, device, surface, surface_loader)?);
    }

    let Some(index) = pick_best(&candidates) else {
        warn!("No GPU satisfies the renderer's requirements");
        return Err(RhiError::NoSuitableDevice);
    };

    let device = devices[index];
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let queue_families = find_queue_families(&candidates[index].queue_families)
        .ok_or(RhiError::NoSuitableDevice)?;

    let selected = PhysicalDeviceInfo {
        device,
        properties,
        queue_families,
    };
    info!(
        "Selected GPU: '{}' ({:?}), graphics family {}, present family {}",
        selected.device_name(),
        properties.device_type,
        queue_families.graphics,
        queue_families.present
    );
    Ok(selected)
}

fn query_candidate(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<DeviceCandidate> {
    let properties = unsafe { instance.get_physical_device_properties(device) };

    let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features_1_3);
    unsafe { instance.get_physical_device_features2(device, &mut features2) };
    let sampler_anisotropy = features2.features.sampler_anisotropy == vk::TRUE;

    let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
        .context("vkEnumerateDeviceExtensionProperties")?;
    let has_swapchain_extension = extensions
        .iter()
        .any(|ext| ext.extension_name_as_c_str().ok() == Some(ash::khr::swapchain::NAME));

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut queue_families = Vec::with_capacity(family_properties.len());
    for (index, family) in family_properties.iter().enumerate() {
        let present = unsafe {
            surface_loader.get_physical_device_surface_support(device, index as u32, surface)
        }
        .context("vkGetPhysicalDeviceSurfaceSupportKHR")?;
        queue_families.push(QueueFamilySupport {
            graphics: family.queue_count > 0
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            present: family.queue_count > 0 && present,
        });
    }

    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown".to_string());

    Ok(DeviceCandidate {
        name,
        device_type: properties.device_type,
        api_version: properties.api_version,
        has_swapchain_extension,
        dynamic_rendering: features_1_3.dynamic_rendering == vk::TRUE,
        synchronization2: features_1_3.synchronization2 == vk::TRUE,
        sampler_anisotropy,
        queue_families,
    })
}
