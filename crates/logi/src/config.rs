//! Renderer configuration, loadable from a JSON file.
//!
//! Every field has a default so a partial (or absent) config file still
//! yields a working renderer; a malformed file logs and falls back rather
//! than aborting a real-time loop.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Clear color for the HDR accumulation target (linear RGBA).
    pub clear_color: [f64; 4],
    /// Present with vsync (`AutoVsync`) or as fast as possible.
    pub vsync: bool,
    /// Start with the shading debug visualization enabled.
    pub debug: bool,
    /// Draw a small gizmo at every light position.
    pub light_debug: bool,
    /// TTF/OTF font for the text overlay. `None` disables text rendering.
    pub font_path: Option<String>,
    /// Pixel size the overlay font is rasterized at.
    pub font_size: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
            debug: false,
            light_debug: false,
            font_path: None,
            font_size: 48.0,
        }
    }
}

impl RenderConfig {
    /// Load a config file, falling back to defaults if it is missing or
    /// malformed (logged, never fatal).
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                log::info!("No render config at '{}' ({e}), using defaults", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Invalid render config '{}': {e}. Using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_remaining_defaults() {
        let config: RenderConfig =
            serde_json::from_str(r#"{ "vsync": false, "light_debug": true }"#).unwrap();
        assert!(!config.vsync);
        assert!(config.light_debug);
        assert_eq!(config.clear_color, RenderConfig::default().clear_color);
        assert_eq!(config.font_size, 48.0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RenderConfig::load_or_default("does/not/exist.json");
        assert!(config.vsync);
        assert!(config.font_path.is_none());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("logi_bad_config_test.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = RenderConfig::load_or_default(&path);
        assert!(config.vsync);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn present_mode_follows_vsync() {
        let mut config = RenderConfig::default();
        assert_eq!(config.present_mode(), wgpu::PresentMode::AutoVsync);
        config.vsync = false;
        assert_eq!(config.present_mode(), wgpu::PresentMode::AutoNoVsync);
    }
}
