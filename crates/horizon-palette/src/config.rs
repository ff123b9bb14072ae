//! Configuration for [`AutoPalette`](crate::AutoPalette).
//!
//! ```toml
//! application_name = "Viewer"
//! settings_format = "json"
//! fallback = "dark"
//!
//! [location]
//! path = "/home/me/.config/gtk-3.0/settings.ini"
//! value_name = "gtk-application-prefer-dark-theme"
//! sense = "truthy-is-dark"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::file::{FileError, FileResult, SettingsFormat, atomic_write, read_text};
use crate::palette::PaletteSelection;
use crate::platform::PreferenceLocation;

/// Organization segment of the default settings directory.
pub const DEFAULT_ORGANIZATION: &str = "Horizon";

/// Options for wiring settings, the preference watcher and the palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPaletteConfig {
    /// Used to derive the default settings directory.
    pub application_name: String,
    /// Where settings are persisted. `None` uses
    /// [`default_settings_path`](Self::default_settings_path).
    pub settings_path: Option<PathBuf>,
    /// On-disk format of the settings file.
    pub settings_format: SettingsFormat,
    /// Palette used when neither the location nor system detection yields a
    /// preference.
    pub fallback: PaletteSelection,
    /// Consult system detection when the location does not exist.
    pub use_system_detection: bool,
    /// Preference location to watch. `None` uses the platform default.
    pub location: Option<PreferenceLocation>,
}

impl Default for AutoPaletteConfig {
    fn default() -> Self {
        Self {
            application_name: "horizon-palette".to_string(),
            settings_path: None,
            settings_format: SettingsFormat::default(),
            fallback: PaletteSelection::Light,
            use_system_detection: true,
            location: None,
        }
    }
}

impl AutoPaletteConfig {
    /// Configuration for the named application with every other option
    /// defaulted.
    pub fn for_application(name: impl Into<String>) -> Self {
        Self {
            application_name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter for [`settings_path`](Self::settings_path).
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Builder-style setter for [`settings_format`](Self::settings_format).
    pub fn with_settings_format(mut self, format: SettingsFormat) -> Self {
        self.settings_format = format;
        self
    }

    /// Builder-style setter for [`location`](Self::location).
    pub fn with_location(mut self, location: PreferenceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Builder-style setter for [`fallback`](Self::fallback).
    pub fn with_fallback(mut self, fallback: PaletteSelection) -> Self {
        self.fallback = fallback;
        self
    }

    /// Builder-style setter for [`use_system_detection`](Self::use_system_detection).
    pub fn with_system_detection(mut self, enabled: bool) -> Self {
        self.use_system_detection = enabled;
        self
    }

    /// `settings.json`, `settings.toml` or `settings.ini` in the per-user
    /// config directory for this application, if the platform has one.
    pub fn default_settings_path(&self) -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", DEFAULT_ORGANIZATION, &self.application_name)?;
        let file_name = match self.settings_format {
            SettingsFormat::Json => "settings.json",
            SettingsFormat::Toml => "settings.toml",
            SettingsFormat::Ini => "settings.ini",
        };
        Some(dirs.config_dir().join(file_name))
    }

    /// The settings path to use: explicit, else the platform default.
    pub fn resolved_settings_path(&self) -> Option<PathBuf> {
        self.settings_path
            .clone()
            .or_else(|| self.default_settings_path())
    }

    /// The preference location to watch: explicit, else the platform default.
    pub fn preference_location(&self) -> Option<PreferenceLocation> {
        self.location
            .clone()
            .or_else(PreferenceLocation::system_default)
    }

    /// Reads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> FileResult<Self> {
        let path = path.as_ref();
        let content = read_text(path)?;
        toml::from_str(&content).map_err(|e| FileError::invalid_data(path, e))
    }

    /// Writes this configuration to a TOML file, atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> FileResult<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).map_err(|e| FileError::invalid_data(path, e))?;
        atomic_write(path, |writer| writer.write_bytes(text.as_bytes()))
    }
}
