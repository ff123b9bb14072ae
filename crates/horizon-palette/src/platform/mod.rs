//! Platform integration: reading and watching the system theme preference.
//!
//! - [`preference`]: locations, one-shot reads and the backend trait
//! - [`PreferenceWatcher`]: background loop that republishes light/dark flips
//! - [`SystemTheme`]: best-effort detection used as a fallback

pub mod preference;
mod system_theme;
mod watcher;

pub use preference::{
    FileBackend, MemoryBackend, PreferenceBackend, PreferenceError, PreferenceLocation,
    PreferenceReader, PreferenceSense, StopSignal, SystemBackend, ThemePreference, WaitOutcome,
};
#[cfg(target_os = "windows")]
pub use preference::RegistryBackend;
pub use system_theme::SystemTheme;
pub use watcher::{ChangeEvent, ChangeKind, PreferenceWatcher, WATCHER_THREAD_NAME, WatcherStatus};
