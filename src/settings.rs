//! Settings management for the webcam classifier
//!
//! Handles loading/saving of the JSON settings file and the default location
//! in the user's config directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierSettings {
    /// Base URL relative model URLs are resolved against
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Location of the model manifest (model.json)
    #[serde(default = "default_model_url")]
    pub model_url: String,

    /// ONNX artifact stored next to the manifest
    #[serde(default = "default_model_file")]
    pub model_file: String,

    /// Input width used when the manifest does not declare one
    #[serde(default = "default_input_size")]
    pub input_width: u32,

    /// Input height used when the manifest does not declare one
    #[serde(default = "default_input_size")]
    pub input_height: u32,

    /// Camera index (0 for the default device)
    #[serde(default)]
    pub camera_index: u32,

    /// Prediction ticks per second (1-240)
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,

    /// ONNX Runtime intra-op threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Whether the session may be started again after a failure or a stop
    /// - true:  the running flag is cleared on failure and on stop
    /// - false: once started, further starts are ignored (default)
    #[serde(default)]
    pub allow_restart: bool,
}

fn default_origin() -> String {
    "http://localhost:8000/".to_string()
}

fn default_model_url() -> String {
    "/tfjs_model/model.json".to_string()
}

fn default_model_file() -> String {
    "model.onnx".to_string()
}

fn default_input_size() -> u32 {
    224
}

fn default_target_fps() -> u32 {
    60
}

fn default_intra_threads() -> usize {
    2
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            model_url: default_model_url(),
            model_file: default_model_file(),
            input_width: default_input_size(),
            input_height: default_input_size(),
            camera_index: 0,
            target_fps: default_target_fps(),
            intra_threads: default_intra_threads(),
            allow_restart: false,
        }
    }
}

impl ClassifierSettings {
    /// Clamp values to their valid ranges
    pub fn clamp(&mut self) {
        self.target_fps = self.target_fps.clamp(1, 240);
        self.input_width = self.input_width.max(1);
        self.input_height = self.input_height.max(1);
        self.intra_threads = self.intra_threads.max(1);
    }

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("WebcamClassifier");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let mut settings: Self = serde_json::from_str(&contents).map_err(SettingsError::Json)?;
        settings.clamp();
        Ok(settings)
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load settings from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(SettingsError::Json)?;
        fs::write(path, json).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Frame interval derived from the target FPS
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(1_000_000_000u64 / self.target_fps.clamp(1, 240) as u64)
    }
}

/// Settings-related errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ClassifierSettings::default();
        assert_eq!(settings.model_url, "/tfjs_model/model.json");
        assert_eq!(settings.target_fps, 60);
        assert_eq!((settings.input_width, settings.input_height), (224, 224));
        assert!(!settings.allow_restart);
    }

    #[test]
    fn test_clamping() {
        let mut settings = ClassifierSettings::default();
        settings.target_fps = 1000;
        settings.input_width = 0;
        settings.intra_threads = 0;
        settings.clamp();
        assert_eq!(settings.target_fps, 240);
        assert_eq!(settings.input_width, 1);
        assert_eq!(settings.intra_threads, 1);

        settings.target_fps = 0;
        settings.clamp();
        assert_eq!(settings.target_fps, 1);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "modelUrl": "models/cats.json", "targetFps": 500 }"#).unwrap();

        let settings = ClassifierSettings::load_from_file(&path).unwrap();
        assert_eq!(settings.model_url, "models/cats.json");
        assert_eq!(settings.target_fps, 240);
        assert_eq!(settings.origin, "http://localhost:8000/");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = ClassifierSettings::default();
        settings.camera_index = 2;
        settings.allow_restart = true;
        settings.save_to_file(&path).unwrap();

        assert_eq!(ClassifierSettings::load_from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_tick_interval() {
        let mut settings = ClassifierSettings::default();
        settings.target_fps = 50;
        assert_eq!(settings.tick_interval(), std::time::Duration::from_millis(20));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ClassifierSettings::load_from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, SettingsError::Io(_)));
        assert!(missing.to_string().starts_with("IO error: "));

        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let garbled = ClassifierSettings::load_from_file(&path).unwrap_err();
        assert!(matches!(garbled, SettingsError::Json(_)));
        assert!(garbled.to_string().starts_with("JSON error: "));
        assert!(std::error::Error::source(&garbled).is_some());
    }
}
