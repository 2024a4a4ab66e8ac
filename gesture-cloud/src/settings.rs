//! Settings management
//!
//! Settings live in a JSON file. Every field has a default, so a partial file
//! (or no file at all) is fine.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::{Palette, Rgb};
use crate::template::{Preset, DEFAULT_PARTICLE_COUNT};

/// Environment variable naming an alternative settings file
pub const SETTINGS_ENV_VAR: &str = "GESTURE_CLOUD_SETTINGS";
/// Settings file looked up in the working directory
pub const SETTINGS_FILE_NAME: &str = "gesture-cloud.json";

pub const MIN_TARGET_FPS: u32 = 24;
pub const MAX_TARGET_FPS: u32 = 240;

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Number of particles, fixed for the lifetime of the app
    pub particle_count: usize,

    /// Preset shown at startup
    pub preset: Preset,

    pub primary_color: Rgb,
    pub secondary_color: Rgb,

    /// Multiplier on top of the gesture scale
    pub global_scale: f32,

    /// Camera device index
    pub camera_index: u32,
    /// Requested capture size; the device may pick something else
    pub camera_width: u32,
    pub camera_height: u32,

    /// Directory holding `palm_detection.onnx` and `hand_landmark.onnx`, searched for when unset
    pub model_dir: Option<PathBuf>,

    /// Animation and redraw rate (24-240)
    pub target_fps: u32,

    /// Default log filter, `RUST_LOG` overrides
    pub log_level: String,

    pub window_width: u32,
    pub window_height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let palette = Palette::default();
        Self {
            particle_count: DEFAULT_PARTICLE_COUNT,
            preset: Preset::default(),
            primary_color: palette.primary,
            secondary_color: palette.secondary,
            global_scale: 1.0,
            camera_index: 0,
            camera_width: 960,
            camera_height: 540,
            model_dir: None,
            target_fps: 60,
            log_level: "info".to_string(),
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl Settings {
    /// Load from `$GESTURE_CLOUD_SETTINGS` or `./gesture-cloud.json`.
    ///
    /// A missing file yields defaults. A file that exists but cannot be read
    /// or parsed is an error.
    pub fn load() -> Result<Self, SettingsError> {
        let path = std::env::var_os(SETTINGS_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE_NAME));

        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load settings from a JSON file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let settings = Self::from_json(&contents)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse and sanitize settings JSON
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Clamp values into their valid ranges
    pub fn sanitize(&mut self) {
        self.particle_count = self.particle_count.max(1);
        self.target_fps = self.target_fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS);
        if !(self.global_scale.is_finite() && self.global_scale > 0.0) {
            log::warn!("Ignoring invalid global scale {}", self.global_scale);
            self.global_scale = 1.0;
        }
        self.camera_width = self.camera_width.max(1);
        self.camera_height = self.camera_height.max(1);
        self.window_width = self.window_width.max(1);
        self.window_height = self.window_height.max(1);
    }

    pub fn palette(&self) -> Palette {
        Palette {
            primary: self.primary_color,
            secondary: self.secondary_color,
        }
    }
}
