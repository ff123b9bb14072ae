//! Logging facilities for Horizon Palette.
//!
//! Horizon Palette uses the `tracing` crate for instrumentation. Nothing is
//! printed unless the application installs a subscriber:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("horizon_palette=debug")
//!         .init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Every event is logged under one of the [`targets`], so a single subsystem
//! can be switched on with a directive such as
//! `horizon_palette::watcher=trace`.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "horizon_palette_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_palette_core::signal";
    /// UI-thread dispatch target.
    pub const DISPATCH: &str = "horizon_palette_core::dispatch";
    /// Preference watcher target.
    pub const WATCHER: &str = "horizon_palette::watcher";
    /// Palette controller target.
    pub const PALETTE: &str = "horizon_palette::palette";
    /// Settings persistence target.
    pub const SETTINGS: &str = "horizon_palette::settings";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for timing a single operation.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create and enter a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_palette::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_are_module_paths() {
        for target in [
            targets::SIGNAL,
            targets::DISPATCH,
            targets::WATCHER,
            targets::PALETTE,
            targets::SETTINGS,
        ] {
            assert!(target.starts_with("horizon_palette"));
            assert!(target.contains("::"));
        }
    }

    #[test]
    fn test_perf_span_without_subscriber() {
        let span = PerfSpan::new("test");
        drop(span);
    }
}
