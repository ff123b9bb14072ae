//! Horizon Palette - keeps an application's palette in sync with the system
//! light/dark preference.
//!
//! The crate is organized in layers:
//!
//! - [`platform`]: reading and watching the preference the operating system
//!   keeps (a registry value on Windows, a key file elsewhere) and
//!   republishing light/dark flips as [`ChangeEvent`]s
//! - [`palette`]: the light and dark color tables and the
//!   [`PaletteController`] that applies them on the UI thread
//! - [`file`]: the persistent [`Settings`](file::Settings) store
//! - [`AutoPalette`]: the glue that ties the three together
//!
//! # Example
//!
//! ```no_run
//! use horizon_palette::{AutoPalette, AutoPaletteConfig};
//! use horizon_palette_core::DispatchQueue;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = DispatchQueue::new();
//!     let config = AutoPaletteConfig::for_application("Viewer");
//!     let auto = AutoPalette::new(config, queue.dispatcher())?;
//!     auto.restore()?;
//!     auto.set_auto_palette(true)?;
//!
//!     loop {
//!         queue.wait_and_process(std::time::Duration::from_millis(100));
//!     }
//! }
//! ```

mod auto_palette;
mod config;
mod error;
pub mod file;
pub mod palette;
pub mod platform;
mod style;

pub use auto_palette::{AUTO_PALETTE_KEY, AutoPalette, STYLE_GROUP, THEME_KEY};
pub use config::{AutoPaletteConfig, DEFAULT_ORGANIZATION};
pub use error::{AutoPaletteError, AutoPaletteResult};
pub use palette::{
    Color, ColorGroup, ColorRole, Palette, PaletteController, PaletteSelection, PaletteTarget,
};
pub use platform::{
    ChangeEvent, ChangeKind, PreferenceError, PreferenceLocation, PreferenceWatcher,
    ThemePreference, WatcherStatus,
};
pub use style::Style;
