//! Configuration management (`lumen.toml`).
//!
//! Every field has a default, so an empty or partial file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub camera: CameraConfig,
    pub light: LightConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer and the debug messenger.
    pub validation: bool,
    /// Directory holding the pre-compiled `.spv` files.
    pub shader_dir: PathBuf,
    /// Width and height of the square shadow map.
    pub shadow_map_resolution: u32,
    pub depth_bias_constant: f32,
    pub depth_bias_slope: f32,
    pub clear_color: [f32; 4],
    /// Clear colour for the overdraw/overshading visualisation target.
    pub debug_clear_color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Movement speed in units per second.
    pub base_speed: f32,
    pub fast_multiplier: f32,
    pub slow_multiplier: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_sensitivity: f32,
}

/// Fixed shadow-casting light frustum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub target: [f32; 3],
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "lumen".to_string(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("assets/shaders/spirv"),
            shadow_map_resolution: 2048,
            depth_bias_constant: 1.25,
            depth_bias_slope: 1.75,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            debug_clear_color: [0.0, 0.1, 0.0, 1.0],
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 0.1,
            far: 100.0,
            base_speed: 1.7,
            fast_multiplier: 5.0,
            slow_multiplier: 0.05,
            mouse_sensitivity: 0.01,
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            position: [1.4418, 6.4484, 0.8148],
            color: [1.0, 1.0, 1.0],
            target: [0.2157, 0.9278, -47.9831],
            fov_degrees: 90.0,
            near: 1.0,
            far: 200.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,lumen=debug".to_string(),
        }
    }
}

impl Config {
    /// Read a configuration file.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file
    /// is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but logs the failure and falls back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.renderer.shadow_map_resolution, 2048);
        assert_eq!(config.renderer.clear_color, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(config.renderer.debug_clear_color, [0.0, 0.1, 0.0, 1.0]);
        assert!((config.camera.base_speed - 1.7).abs() < f32::EPSILON);
        assert_eq!(config.logging.filter, "info,lumen=debug");
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.window.title, "lumen");
        assert!((config.light.fov_degrees - 90.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
[renderer]
shadow_map_resolution = 1024

[camera]
fov_degrees = 75.0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.renderer.shadow_map_resolution, 1024);
        assert!((config.renderer.depth_bias_constant - 1.25).abs() < f32::EPSILON);
        assert!((config.camera.fov_degrees - 75.0).abs() < f32::EPSILON);
        assert!((config.camera.near - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\nwidth = 640\nheight = 480").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window\nwidth = ").unwrap();

        assert!(Config::load(file.path()).is_err());
        assert_eq!(Config::load_or_default(file.path()).window.width, 1280);
    }
}
