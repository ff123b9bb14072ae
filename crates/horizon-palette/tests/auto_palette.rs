//! End-to-end tests: persisted settings, restore, and following a preference
//! through the watcher into palette targets.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use horizon_palette::file::SettingsFormat;
use horizon_palette::platform::{FileBackend, MemoryBackend, PreferenceLocation};
use horizon_palette::{
    AUTO_PALETTE_KEY, AutoPalette, AutoPaletteConfig, Palette, PaletteSelection, PaletteTarget,
    STYLE_GROUP, Style, THEME_KEY, ThemePreference,
};
use horizon_palette_core::DispatchQueue;
use parking_lot::Mutex;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Records everything applied to it.
#[derive(Default)]
struct RecordingTarget {
    styles: Mutex<Vec<String>>,
    palettes: Mutex<Vec<Palette>>,
}

impl PaletteTarget for RecordingTarget {
    fn apply_palette(&self, palette: &Palette) {
        self.palettes.lock().push(palette.clone());
    }

    fn apply_style(&self, style_name: &str) {
        self.styles.lock().push(style_name.to_string());
    }
}

/// Pump the queue until `done` holds or the timeout passes.
fn pump_until(queue: &DispatchQueue, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        queue.wait_and_process(Duration::from_millis(20));
    }
    done()
}

/// Wait, without pumping, until `count` invocations are queued.
fn wait_for_pending(queue: &DispatchQueue, count: usize) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while queue.pending_count() < count {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::yield_now();
    }
    true
}

fn config_in(dir: &tempfile::TempDir, location: PreferenceLocation) -> AutoPaletteConfig {
    AutoPaletteConfig::for_application("palette-tests")
        .with_settings_path(dir.path().join("settings.json"))
        .with_settings_format(SettingsFormat::Json)
        .with_location(location)
        .with_system_detection(false)
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let location = PreferenceLocation::windows_personalize();
    backend.set(&location, false);
    let queue = DispatchQueue::new();

    {
        let auto = AutoPalette::with_backend(
            config_in(&dir, location.clone()),
            backend.clone(),
            queue.dispatcher(),
        )
        .unwrap();
        auto.set_style(Style::Classic).unwrap();
        auto.set_auto_palette(true).unwrap();
        auto.shutdown();
    }
    assert_eq!(backend.open_handles(), 0);

    let text = fs::read_to_string(dir.path().join("settings.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json[STYLE_GROUP][THEME_KEY], 1);
    assert_eq!(json[STYLE_GROUP][AUTO_PALETTE_KEY], true);

    let target = Arc::new(RecordingTarget::default());
    let auto = AutoPalette::with_backend(
        config_in(&dir, location.clone()),
        backend.clone(),
        queue.dispatcher(),
    )
    .unwrap();
    auto.add_target(target.clone());
    auto.restore().unwrap();

    assert_eq!(auto.load_style(), Style::Classic);
    assert!(auto.auto_palette_enabled());
    assert!(auto.is_watching());
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Dark));
    assert_eq!(target.styles.lock().last().map(String::as_str), Some("windows"));
    assert_eq!(target.palettes.lock().last(), Some(&Palette::dark()));

    auto.shutdown();
}

#[test]
fn test_follows_transitions_until_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let location = PreferenceLocation::windows_personalize();
    backend.set(&location, true);
    let queue = DispatchQueue::new();

    let target = Arc::new(RecordingTarget::default());
    let auto = AutoPalette::with_backend(
        config_in(&dir, location.clone()),
        backend.clone(),
        queue.dispatcher(),
    )
    .unwrap();
    auto.add_target(target.clone());

    auto.set_auto_palette(true).unwrap();
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Light));

    backend.set_preference(&location, ThemePreference::Dark);
    assert!(pump_until(&queue, || {
        auto.controller().current() == Some(PaletteSelection::Dark)
    }));

    backend.set_preference(&location, ThemePreference::Light);
    assert!(pump_until(&queue, || {
        auto.controller().current() == Some(PaletteSelection::Light)
    }));

    // The style changes but the palette stays the system's.
    auto.set_style(Style::DarkFusion).unwrap();
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Light));
    assert_eq!(target.styles.lock().last().map(String::as_str), Some("Fusion"));

    // Disabling falls back to the style's own palette.
    auto.set_auto_palette(false).unwrap();
    queue.process_pending();
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Dark));
    assert_eq!(backend.open_handles(), 0);

    let applied = target.palettes.lock().len();
    backend.set_preference(&location, ThemePreference::Dark);
    queue.wait_and_process(Duration::from_millis(100));
    assert_eq!(target.palettes.lock().len(), applied);
}

#[test]
fn test_disable_drops_transition_already_queued() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let location = PreferenceLocation::windows_personalize();
    backend.set(&location, true);
    let queue = DispatchQueue::new();

    let target = Arc::new(RecordingTarget::default());
    let auto = AutoPalette::with_backend(
        config_in(&dir, location.clone()),
        backend.clone(),
        queue.dispatcher(),
    )
    .unwrap();
    auto.add_target(target.clone());
    auto.set_auto_palette(true).unwrap();
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Light));

    // The flip to dark reaches the UI thread's queue but is not processed yet.
    backend.set(&location, false);
    assert!(wait_for_pending(&queue, 1));

    auto.set_auto_palette(false).unwrap();
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Light));
    let applied = target.palettes.lock().len();

    assert_eq!(queue.process_pending(), 1);
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Light));
    assert_eq!(target.palettes.lock().len(), applied);
    assert_eq!(target.palettes.lock().last(), Some(&Palette::light()));

    // Following again picks the dark preference up afresh.
    auto.set_auto_palette(true).unwrap();
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Dark));
    auto.shutdown();
}

#[test]
fn test_missing_location_uses_configured_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let queue = DispatchQueue::new();
    let config = config_in(&dir, PreferenceLocation::windows_personalize())
        .with_fallback(PaletteSelection::Dark);

    let auto = AutoPalette::with_backend(config, backend.clone(), queue.dispatcher()).unwrap();
    auto.set_auto_palette(true).unwrap();

    assert!(auto.auto_palette_enabled());
    assert!(!auto.is_watching());
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Dark));
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_corrupt_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
    let queue = DispatchQueue::new();

    let result = AutoPalette::with_backend(
        config_in(&dir, PreferenceLocation::windows_personalize()),
        MemoryBackend::new(),
        queue.dispatcher(),
    );
    assert!(matches!(
        result,
        Err(horizon_palette::AutoPaletteError::Settings(_))
    ));
}

#[test]
fn test_key_file_preference_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let location = PreferenceLocation::gtk_settings(dir.path().join("settings.ini"));
    fs::write(
        &location.path,
        "[Settings]\ngtk-theme-name=Adwaita\ngtk-application-prefer-dark-theme=0\n",
    )
    .unwrap();
    let queue = DispatchQueue::new();

    let auto =
        AutoPalette::with_backend(config_in(&dir, location.clone()), FileBackend, queue.dispatcher())
            .unwrap();
    auto.set_auto_palette(true).unwrap();
    assert_eq!(auto.controller().current(), Some(PaletteSelection::Light));

    FileBackend
        .write(&location, ThemePreference::Dark)
        .unwrap();
    assert!(pump_until(&queue, || {
        auto.controller().current() == Some(PaletteSelection::Dark)
    }));

    // Unrelated keys survive the rewrite.
    let text = fs::read_to_string(&location.path).unwrap();
    assert!(text.contains("gtk-theme-name=Adwaita"));

    auto.shutdown();
    assert!(!auto.is_watching());
}
