//! Top-level error type.

use horizon_palette_core::DispatchError;

use crate::file::FileError;
use crate::platform::PreferenceError;

/// Errors surfaced by [`AutoPalette`](crate::AutoPalette).
#[derive(Debug, thiserror::Error)]
pub enum AutoPaletteError {
    /// Reading or watching the system preference failed.
    #[error("preference error: {0}")]
    Preference(#[from] PreferenceError),

    /// Loading or saving settings failed.
    #[error("settings error: {0}")]
    Settings(#[from] FileError),

    /// The UI thread's dispatch queue is gone.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// No settings path was configured and the platform has no config directory.
    #[error("no settings location available")]
    NoSettingsPath,
}

impl AutoPaletteError {
    /// Returns true if the watched preference location does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Preference(err) if err.is_not_found())
    }
}

/// Result alias for [`AutoPaletteError`].
pub type AutoPaletteResult<T> = Result<T, AutoPaletteError>;
