//! Best-effort system theme detection.
//!
//! Used when the watched preference location does not exist. Detection goes
//! through the `dark-light` crate, which knows each desktop's own mechanism
//! (`AppleInterfaceStyle` on macOS, the XDG portal `color-scheme` on Linux,
//! `AppsUseLightTheme` on Windows).

use super::ThemePreference;

/// One-shot queries for the current system color scheme.
pub struct SystemTheme;

impl SystemTheme {
    /// The detected preference, or `None` if the system has no preference
    /// or detection is unavailable.
    #[cfg(feature = "system-theme")]
    pub fn detect() -> Option<ThemePreference> {
        match dark_light::detect() {
            dark_light::Mode::Dark => Some(ThemePreference::Dark),
            dark_light::Mode::Light => Some(ThemePreference::Light),
            dark_light::Mode::Default => None,
        }
    }

    #[cfg(not(feature = "system-theme"))]
    pub fn detect() -> Option<ThemePreference> {
        None
    }

    /// Returns true if detection is compiled in.
    pub fn is_available() -> bool {
        cfg!(feature = "system-theme")
    }
}
