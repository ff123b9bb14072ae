//! Settings persistence and file helpers.
//!
//! ```ignore
//! use horizon_palette::file::{Settings, SettingsFormat};
//!
//! let settings = Settings::open("settings.json", SettingsFormat::Json)?;
//! settings.write("Style", "Theme", 3)?;
//!
//! settings.changed().connect(|key| {
//!     println!("Setting changed: {}", key);
//! });
//! ```

mod error;
mod operations;
mod settings;

pub use error::{FileError, FileErrorKind, FileResult};
pub use operations::{AtomicWriter, atomic_write, read_text};
pub use settings::{FromSettingsValue, Settings, SettingsFormat, SettingsValue};
