//! Horizon Palette Watch Example
//!
//! Follows the system light/dark preference and prints every palette that
//! gets applied. Flip the theme in the system settings while it runs.
//!
//! Pass a GTK-style `settings.ini` path to watch that file instead of the
//! platform default; editing its `gtk-application-prefer-dark-theme` key
//! switches the palette.
//!
//! Run with: cargo run -p horizon-palette --example watch_theme [settings.ini]

use std::sync::Arc;
use std::time::{Duration, Instant};

use horizon_palette::platform::{FileBackend, PreferenceBackend, PreferenceLocation};
use horizon_palette::{
    AutoPalette, AutoPaletteConfig, ColorRole, Palette, PaletteTarget, Style,
};
use horizon_palette_core::DispatchQueue;
use tracing_subscriber::EnvFilter;

/// How long the example keeps watching.
const RUN_FOR: Duration = Duration::from_secs(120);

/// Stand-in for an application window.
struct ConsoleTarget;

impl PaletteTarget for ConsoleTarget {
    fn apply_palette(&self, palette: &Palette) {
        let window = palette.active(ColorRole::Window);
        let text = palette.active(ColorRole::WindowText);
        println!("palette applied: window {window:?}, text {text:?}");
    }

    fn apply_style(&self, style_name: &str) {
        println!("style applied: {style_name}");
    }
}

fn run<B: PreferenceBackend>(
    queue: &DispatchQueue,
    auto: AutoPalette<B>,
) -> Result<(), Box<dyn std::error::Error>> {
    auto.add_target(Arc::new(ConsoleTarget));
    auto.restore()?;
    auto.set_style(Style::LightFusion)?;
    auto.set_auto_palette(true)?;

    println!(
        "following {:?} for {}s",
        auto.watcher().location(),
        RUN_FOR.as_secs()
    );

    let deadline = Instant::now() + RUN_FOR;
    while Instant::now() < deadline {
        queue.wait_and_process(Duration::from_millis(100));
    }

    auto.shutdown();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; override with RUST_LOG=horizon_palette=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let queue = DispatchQueue::new();
    let settings_dir = tempfile::tempdir()?;
    let config = AutoPaletteConfig::for_application("watch-theme")
        .with_settings_path(settings_dir.path().join("settings.toml"));

    match std::env::args().nth(1) {
        Some(path) => {
            let config = config.with_location(PreferenceLocation::gtk_settings(path));
            let auto = AutoPalette::with_backend(config, FileBackend::new(), queue.dispatcher())?;
            run(&queue, auto)
        }
        None => {
            let auto = AutoPalette::new(config, queue.dispatcher())?;
            run(&queue, auto)
        }
    }
}
