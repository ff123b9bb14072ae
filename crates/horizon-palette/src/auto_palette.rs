//! Wiring settings, the preference watcher and the palette controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use horizon_palette_core::Dispatcher;
use horizon_palette_core::logging::{PerfSpan, targets};

use crate::config::AutoPaletteConfig;
use crate::error::{AutoPaletteError, AutoPaletteResult};
use crate::file::Settings;
use crate::palette::{PaletteController, PaletteSelection, PaletteTarget};
use crate::platform::{
    PreferenceBackend, PreferenceLocation, PreferenceWatcher, SystemBackend, SystemTheme,
};
use crate::style::Style;

const TARGET: &str = targets::PALETTE;

/// Settings group holding the style keys.
pub const STYLE_GROUP: &str = "Style";
/// Key of the persisted [`Style`] index.
pub const THEME_KEY: &str = "Theme";
/// Key of the persisted auto-palette flag.
pub const AUTO_PALETTE_KEY: &str = "AutoPalette";

/// Keeps the application palette in sync with the system preference.
///
/// Owns the settings store, the [`PaletteController`] and a
/// [`PreferenceWatcher`] whose change events are connected to the
/// controller. Create it on the UI thread, with that thread's dispatcher.
///
/// ```
/// use std::sync::Arc;
/// use horizon_palette::{AutoPalette, AutoPaletteConfig, PaletteSelection};
/// use horizon_palette::file::Settings;
/// use horizon_palette::platform::{MemoryBackend, PreferenceLocation};
/// use horizon_palette_core::DispatchQueue;
///
/// let queue = DispatchQueue::new();
/// let backend = MemoryBackend::new();
/// let location = PreferenceLocation::windows_personalize();
/// backend.set(&location, false);
///
/// let config = AutoPaletteConfig::default().with_location(location);
/// let auto = AutoPalette::from_parts(
///     config,
///     Arc::new(Settings::new()),
///     backend,
///     queue.dispatcher(),
/// );
///
/// auto.set_auto_palette(true).unwrap();
/// assert!(auto.is_watching());
/// assert_eq!(auto.controller().current(), Some(PaletteSelection::Dark));
/// ```
pub struct AutoPalette<B: PreferenceBackend = SystemBackend> {
    config: AutoPaletteConfig,
    settings: Arc<Settings>,
    controller: PaletteController,
    watcher: PreferenceWatcher<B>,
    /// Bumped whenever following stops; watcher events queued before that
    /// are dropped on the UI thread.
    follow_generation: Arc<AtomicU64>,
}

impl AutoPalette<SystemBackend> {
    /// Create an instance over the platform's preference backend, with
    /// settings opened from the configured path.
    ///
    /// # Errors
    ///
    /// Fails if the settings file exists but cannot be read, or if no settings
    /// path is configured and the platform has no config directory.
    pub fn new(config: AutoPaletteConfig, dispatcher: Dispatcher) -> AutoPaletteResult<Self> {
        Self::with_backend(config, SystemBackend::new(), dispatcher)
    }
}

impl<B: PreferenceBackend> AutoPalette<B> {
    /// Create an instance over `backend`, with settings opened from the
    /// configured path.
    pub fn with_backend(
        config: AutoPaletteConfig,
        backend: B,
        dispatcher: Dispatcher,
    ) -> AutoPaletteResult<Self> {
        let path = config
            .resolved_settings_path()
            .ok_or(AutoPaletteError::NoSettingsPath)?;
        let settings = Settings::open(&path, config.settings_format)?;
        tracing::debug!(target: TARGET, path = %path.display(), "settings opened");
        Ok(Self::from_parts(config, Arc::new(settings), backend, dispatcher))
    }

    /// Assemble an instance from existing parts.
    pub fn from_parts(
        config: AutoPaletteConfig,
        settings: Arc<Settings>,
        backend: B,
        dispatcher: Dispatcher,
    ) -> Self {
        let controller = PaletteController::new(dispatcher);
        let watcher = PreferenceWatcher::new(backend);

        let follow_generation = Arc::new(AtomicU64::new(0));

        let slot_controller = controller.clone();
        let slot_generation = Arc::clone(&follow_generation);
        watcher.changed().connect(move |event| {
            let generation = slot_generation.load(Ordering::SeqCst);
            let follow = Arc::clone(&slot_generation);
            slot_controller
                .handle_change_while(event, move || follow.load(Ordering::SeqCst) == generation);
        });
        watcher.errors().connect(|err| {
            tracing::warn!(target: TARGET, error = %err, "system preference tracking interrupted");
        });

        Self {
            config,
            settings,
            controller,
            watcher,
            follow_generation,
        }
    }

    /// The configuration this instance was built with.
    pub fn config(&self) -> &AutoPaletteConfig {
        &self.config
    }

    /// The settings store.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// The palette controller.
    pub fn controller(&self) -> &PaletteController {
        &self.controller
    }

    /// The preference watcher.
    pub fn watcher(&self) -> &PreferenceWatcher<B> {
        &self.watcher
    }

    /// Register a surface to receive palettes.
    pub fn add_target(&self, target: Arc<dyn PaletteTarget>) {
        self.controller.add_target(target);
    }

    /// The persisted style, or [`Style::default`] if none or unrecognized.
    pub fn load_style(&self) -> Style {
        let Some(value) = self.settings.read(STYLE_GROUP, THEME_KEY) else {
            return Style::default();
        };
        match value.as_integer().and_then(Style::from_index) {
            Some(style) => style,
            None => {
                tracing::warn!(target: TARGET, ?value, "unrecognized stored style, using default");
                Style::default()
            }
        }
    }

    /// Persist `style` and apply it.
    ///
    /// While the palette follows the system, only the style changes; the
    /// palette stays the system's.
    pub fn set_style(&self, style: Style) -> AutoPaletteResult<()> {
        self.settings.write(STYLE_GROUP, THEME_KEY, style.index())?;

        let following = self.watcher.is_running();
        let selection = match self.watcher.last_observed() {
            Some(preference) if following => PaletteSelection::from(preference),
            _ => style.palette(),
        };
        tracing::info!(target: TARGET, %style, following, "style selected");
        self.controller.apply_style_with(style, selection)?;
        Ok(())
    }

    /// Returns true if the persisted auto-palette flag is set.
    pub fn auto_palette_enabled(&self) -> bool {
        self.settings.value_or(STYLE_GROUP, AUTO_PALETTE_KEY, false)
    }

    /// Returns true if the palette is currently following the watched location.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_running()
    }

    /// Turn following the system preference on or off, and persist the choice.
    ///
    /// Enabling starts the watcher; its initial event applies the current
    /// preference. If the location does not exist, the system-detected or
    /// configured fallback palette is applied once instead and nothing is
    /// watched. Disabling stops the watcher and restores the style's palette.
    ///
    /// # Errors
    ///
    /// Persisting the flag failed, or the watcher could not start for a
    /// reason other than a missing location.
    pub fn set_auto_palette(&self, enabled: bool) -> AutoPaletteResult<()> {
        self.settings.write(STYLE_GROUP, AUTO_PALETTE_KEY, enabled)?;

        if enabled {
            self.follow_system()?;
        } else {
            self.stop_following();
            let style = self.load_style();
            self.controller.apply_palette(style.palette())?;
        }
        tracing::info!(target: TARGET, enabled, "auto palette toggled");
        Ok(())
    }

    /// Re-apply the persisted style and auto-palette state. Call once at startup.
    pub fn restore(&self) -> AutoPaletteResult<()> {
        let _perf = PerfSpan::new("restore");
        let style = self.load_style();
        let selection = if self.auto_palette_enabled() {
            self.follow_system()?
        } else {
            style.palette()
        };
        self.controller.apply_style_with(style, selection)?;
        tracing::debug!(target: TARGET, %style, %selection, "palette state restored");
        Ok(())
    }

    /// Stop following the system preference without changing the setting.
    pub fn shutdown(&self) {
        self.stop_following();
    }

    /// Stop the watcher and invalidate its events still queued for the UI thread.
    fn stop_following(&self) {
        self.watcher.stop();
        self.follow_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Start the watcher, or apply a fallback when there is nothing to watch.
    fn follow_system(&self) -> AutoPaletteResult<PaletteSelection> {
        let Some(location) = self.config.preference_location() else {
            return self.apply_fallback(None);
        };

        match self.watcher.start(&location) {
            Ok(()) => Ok(self
                .watcher
                .last_observed()
                .map(PaletteSelection::from)
                .unwrap_or(self.config.fallback)),
            Err(err) if err.is_not_found() => self.apply_fallback(Some(&location)),
            Err(err) => Err(err.into()),
        }
    }

    fn apply_fallback(
        &self,
        location: Option<&PreferenceLocation>,
    ) -> AutoPaletteResult<PaletteSelection> {
        let detected = if self.config.use_system_detection {
            SystemTheme::detect()
        } else {
            None
        };
        let selection = detected
            .map(PaletteSelection::from)
            .unwrap_or(self.config.fallback);

        tracing::info!(
            target: TARGET,
            location = ?location,
            detected = detected.is_some(),
            %selection,
            "preference location unavailable, applying fallback palette"
        );
        self.controller.apply_palette(selection)?;
        Ok(selection)
    }
}

impl<B: PreferenceBackend> std::fmt::Debug for AutoPalette<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoPalette")
            .field("config", &self.config)
            .field("controller", &self.controller)
            .field("watching", &self.is_watching())
            .finish_non_exhaustive()
    }
}
