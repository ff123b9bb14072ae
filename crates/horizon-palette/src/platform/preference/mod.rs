//! System light/dark preference access.
//!
//! A [`PreferenceLocation`] names a boolean-like value inside a watchable
//! preference store (a registry key, a settings key file, ...). A
//! [`PreferenceBackend`] knows how to read such a value once and how to block
//! until the store signals that something under the location changed.
//!
//! # Backends
//!
//! - [`RegistryBackend`] (Windows): `RegNotifyChangeKeyValue` on the key,
//!   composed with a stop event through `WaitForMultipleObjects`.
//! - [`FileBackend`]: an INI-style key file watched with `notify`.
//! - [`MemoryBackend`]: an in-process store for headless runs and tests.
//!
//! # One-shot reads
//!
//! ```
//! use horizon_palette::platform::{MemoryBackend, PreferenceLocation, PreferenceReader};
//!
//! let backend = MemoryBackend::new();
//! let location = PreferenceLocation::windows_personalize();
//! backend.set(&location, true);
//!
//! let reader = PreferenceReader::new(backend);
//! assert!(reader.read(&location).unwrap().is_light());
//! ```

mod file;
mod memory;
#[cfg(target_os = "windows")]
mod registry;

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use file::{FileBackend, FileStop, FileWatch};
pub use memory::{MemoryBackend, MemoryStop, MemoryWatch};
#[cfg(target_os = "windows")]
pub use registry::{RegistryBackend, RegistryStop, RegistryWatch};

/// The backend used for the platform's canonical preference location.
#[cfg(target_os = "windows")]
pub type SystemBackend = RegistryBackend;

/// The backend used for the platform's canonical preference location.
#[cfg(not(target_os = "windows"))]
pub type SystemBackend = FileBackend;

// ============================================================================
// Theme Preference
// ============================================================================

/// The system's light/dark preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    /// Dark text on light surfaces.
    Light,
    /// Light text on dark surfaces.
    Dark,
}

impl ThemePreference {
    /// Build a preference from the "is light" boolean the OS stores.
    pub fn from_is_light(is_light: bool) -> Self {
        if is_light { Self::Light } else { Self::Dark }
    }

    /// Returns true for [`ThemePreference::Light`].
    pub fn is_light(&self) -> bool {
        matches!(self, Self::Light)
    }

    /// Returns true for [`ThemePreference::Dark`].
    pub fn is_dark(&self) -> bool {
        matches!(self, Self::Dark)
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors reading or watching a preference location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreferenceError {
    /// The location or the value inside it does not exist.
    #[error("preference not found: {location}")]
    NotFound { location: String },

    /// The OS refused query or notify access.
    #[error("access denied to preference: {location}")]
    AccessDenied { location: String },

    /// Any other failure opening, waiting on or reading the location.
    #[error("platform error: {message}")]
    Platform { message: String },
}

impl PreferenceError {
    /// Create a not-found error for a location.
    pub fn not_found(location: &PreferenceLocation) -> Self {
        Self::NotFound {
            location: location.to_string(),
        }
    }

    /// Create an access-denied error for a location.
    pub fn access_denied(location: &PreferenceLocation) -> Self {
        Self::AccessDenied {
            location: location.to_string(),
        }
    }

    /// Create a platform error.
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// Classify an I/O error raised while touching `location`.
    pub fn from_io(err: io::Error, location: &PreferenceLocation) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::not_found(location),
            io::ErrorKind::PermissionDenied => Self::access_denied(location),
            _ => Self::platform(format!("{location}: {err}")),
        }
    }

    /// Returns true if this is [`PreferenceError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is [`PreferenceError::AccessDenied`].
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

impl From<notify::Error> for PreferenceError {
    fn from(err: notify::Error) -> Self {
        Self::platform(format!("file watch failed: {err}"))
    }
}

// ============================================================================
// Location
// ============================================================================

/// How a stored boolean maps onto a [`ThemePreference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferenceSense {
    /// A truthy value means the light theme (`AppsUseLightTheme`).
    TruthyIsLight,
    /// A truthy value means the dark theme (`gtk-application-prefer-dark-theme`).
    TruthyIsDark,
}

impl PreferenceSense {
    /// Interpret a stored boolean.
    pub fn interpret(self, value: bool) -> ThemePreference {
        match self {
            Self::TruthyIsLight => ThemePreference::from_is_light(value),
            Self::TruthyIsDark => ThemePreference::from_is_light(!value),
        }
    }

    /// The stored boolean that represents `preference`.
    pub fn encode(self, preference: ThemePreference) -> bool {
        match self {
            Self::TruthyIsLight => preference.is_light(),
            Self::TruthyIsDark => preference.is_dark(),
        }
    }
}

/// A watchable place where the system stores its light/dark preference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferenceLocation {
    /// Registry subkey or key-file path.
    pub path: String,
    /// Name of the value inside `path`.
    pub value_name: String,
    /// How the stored value maps onto light/dark.
    pub sense: PreferenceSense,
}

impl PreferenceLocation {
    /// Registry subkey holding the per-user personalization settings.
    pub const PERSONALIZE_KEY: &'static str =
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Themes\\Personalize";
    /// Value under [`PERSONALIZE_KEY`](Self::PERSONALIZE_KEY) that is 1 for light apps.
    pub const APPS_USE_LIGHT_THEME: &'static str = "AppsUseLightTheme";
    /// GTK settings key that is true when applications should be dark.
    pub const GTK_PREFER_DARK: &'static str = "gtk-application-prefer-dark-theme";

    /// Create a location.
    pub fn new(
        path: impl Into<String>,
        value_name: impl Into<String>,
        sense: PreferenceSense,
    ) -> Self {
        Self {
            path: path.into(),
            value_name: value_name.into(),
            sense,
        }
    }

    /// `HKEY_CURRENT_USER\...\Themes\Personalize`, value `AppsUseLightTheme`.
    pub fn windows_personalize() -> Self {
        Self::new(
            Self::PERSONALIZE_KEY,
            Self::APPS_USE_LIGHT_THEME,
            PreferenceSense::TruthyIsLight,
        )
    }

    /// `gtk-application-prefer-dark-theme` inside a GTK `settings.ini`.
    pub fn gtk_settings(path: impl AsRef<Path>) -> Self {
        Self::new(
            path.as_ref().to_string_lossy(),
            Self::GTK_PREFER_DARK,
            PreferenceSense::TruthyIsDark,
        )
    }

    /// The canonical location for the current platform.
    ///
    /// On Windows this is the personalization key. Elsewhere it is the user's
    /// GTK 3 `settings.ini`; `None` if the config directory is unknown.
    pub fn system_default() -> Option<Self> {
        #[cfg(target_os = "windows")]
        {
            Some(Self::windows_personalize())
        }

        #[cfg(not(target_os = "windows"))]
        {
            let dirs = directories::BaseDirs::new()?;
            Some(Self::gtk_settings(
                dirs.config_dir().join("gtk-3.0").join("settings.ini"),
            ))
        }
    }
}

impl fmt::Display for PreferenceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.path, self.value_name)
    }
}

/// Parse a boolean-like textual value.
///
/// Accepts the usual spellings plus any integer (non-zero is truthy).
pub(crate) fn parse_truthy(raw: &str) -> Option<bool> {
    let raw = raw.trim().trim_matches('"');
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        other => other.parse::<i64>().ok().map(|n| n != 0),
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Why a [`PreferenceBackend::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The store signalled a change under the watched location.
    Changed,
    /// The stop signal was raised.
    Stopped,
}

/// An application-owned cancellation handle for a blocking wait.
///
/// Raising is level-triggered: once raised, every current and future
/// [`PreferenceBackend::wait`] with this signal returns
/// [`WaitOutcome::Stopped`].
pub trait StopSignal: Send + Sync + 'static {
    /// Raise the signal, waking any wait blocked on it.
    fn raise(&self);

    /// Returns true once [`raise`](Self::raise) has been called.
    fn is_raised(&self) -> bool;
}

/// Access to a preference store and its change notifications.
pub trait PreferenceBackend: Send + Sync + 'static {
    /// OS resources needed to wait for a change. Released on drop.
    type Watch: Send + 'static;
    /// Cancellation handle composed into [`wait`](Self::wait).
    type Stop: StopSignal;

    /// Read the current preference. Opens the location query-only and closes
    /// it before returning.
    fn read(&self, location: &PreferenceLocation) -> Result<ThemePreference, PreferenceError>;

    /// Create a fresh, unraised stop signal.
    fn stop_signal(&self) -> Result<Self::Stop, PreferenceError>;

    /// Open and arm a watch on `location`.
    fn open_watch(&self, location: &PreferenceLocation) -> Result<Self::Watch, PreferenceError>;

    /// Block until the watch fires or `stop` is raised.
    ///
    /// If both are pending, [`WaitOutcome::Stopped`] wins.
    fn wait(&self, watch: &mut Self::Watch, stop: &Self::Stop)
    -> Result<WaitOutcome, PreferenceError>;

    /// Register for the next notification after the watch fired.
    fn rearm(&self, watch: &mut Self::Watch) -> Result<(), PreferenceError>;
}

// ============================================================================
// Reader
// ============================================================================

/// Stateless one-shot preference queries.
///
/// Performs no caching; every call goes to the backend.
#[derive(Debug, Clone, Default)]
pub struct PreferenceReader<B> {
    backend: B,
}

impl<B: PreferenceBackend> PreferenceReader<B> {
    /// Create a reader over `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Query the current preference at `location`.
    pub fn read(&self, location: &PreferenceLocation) -> Result<ThemePreference, PreferenceError> {
        self.backend.read(location)
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sense_interpretation() {
        assert_eq!(
            PreferenceSense::TruthyIsLight.interpret(true),
            ThemePreference::Light
        );
        assert_eq!(
            PreferenceSense::TruthyIsDark.interpret(true),
            ThemePreference::Dark
        );
        assert!(!PreferenceSense::TruthyIsDark.encode(ThemePreference::Light));
        assert!(PreferenceSense::TruthyIsLight.encode(ThemePreference::Light));
    }

    #[test]
    fn test_parse_truthy() {
        assert_eq!(parse_truthy("1"), Some(true));
        assert_eq!(parse_truthy("0"), Some(false));
        assert_eq!(parse_truthy(" TRUE "), Some(true));
        assert_eq!(parse_truthy("off"), Some(false));
        assert_eq!(parse_truthy("\"yes\""), Some(true));
        assert_eq!(parse_truthy("maybe"), None);
    }

    #[test]
    fn test_location_display() {
        let location = PreferenceLocation::windows_personalize();
        assert!(location.to_string().ends_with("Personalize[AppsUseLightTheme]"));
    }

    #[test]
    fn test_error_classification() {
        let location = PreferenceLocation::gtk_settings("/tmp/settings.ini");

        let err = PreferenceError::from_io(io::Error::from(io::ErrorKind::NotFound), &location);
        assert!(err.is_not_found());

        let err = PreferenceError::from_io(
            io::Error::from(io::ErrorKind::PermissionDenied),
            &location,
        );
        assert!(err.is_access_denied());

        let err = PreferenceError::from_io(io::Error::other("boom"), &location);
        assert!(matches!(err, PreferenceError::Platform { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_theme_preference() {
        assert!(ThemePreference::from_is_light(true).is_light());
        assert!(ThemePreference::from_is_light(false).is_dark());
        assert_eq!(ThemePreference::Dark.to_string(), "dark");
    }
}
