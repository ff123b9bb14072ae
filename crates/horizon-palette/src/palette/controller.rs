//! Applying palettes on the UI thread.

use std::sync::Arc;

use horizon_palette_core::logging::targets;
use horizon_palette_core::{DispatchError, Dispatcher, Signal};
use parking_lot::{Mutex, RwLock};

use super::{Palette, PaletteSelection};
use crate::platform::ChangeEvent;
use crate::style::Style;

const TARGET: &str = targets::PALETTE;

/// A surface that renders with a palette: the application, its tooltips, ...
///
/// Methods are only ever called on the controller's dispatch thread.
pub trait PaletteTarget: Send + Sync {
    /// Replace the target's palette.
    fn apply_palette(&self, palette: &Palette);

    /// Switch the target's widget style (`"Fusion"`, `"windows"`, ...).
    fn apply_style(&self, style_name: &str) {
        let _ = style_name;
    }
}

/// Holds the active palette selection and applies palettes to targets.
///
/// Every apply is one invocation posted to the UI thread's [`Dispatcher`]:
/// all targets are updated and the selection is recorded before anything
/// else runs on that thread, so no half-applied state is observable there.
/// Cloning gives another handle to the same controller.
#[derive(Clone)]
pub struct PaletteController {
    dispatcher: Dispatcher,
    targets: Arc<RwLock<Vec<Arc<dyn PaletteTarget>>>>,
    current: Arc<Mutex<Option<PaletteSelection>>>,
    applied: Arc<Signal<PaletteSelection>>,
}

impl PaletteController {
    /// Create a controller that applies palettes on `dispatcher`'s thread.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            targets: Arc::new(RwLock::new(Vec::new())),
            current: Arc::new(Mutex::new(None)),
            applied: Arc::new(Signal::new()),
        }
    }

    /// Register a surface to receive every future palette.
    pub fn add_target(&self, target: Arc<dyn PaletteTarget>) {
        self.targets.write().push(target);
    }

    /// Number of registered targets.
    pub fn target_count(&self) -> usize {
        self.targets.read().len()
    }

    /// Signal emitted on the UI thread after a palette has been applied.
    pub fn applied(&self) -> &Signal<PaletteSelection> {
        &self.applied
    }

    /// The selection most recently applied on the UI thread.
    pub fn current(&self) -> Option<PaletteSelection> {
        *self.current.lock()
    }

    /// The palette most recently applied on the UI thread.
    pub fn palette(&self) -> Option<Palette> {
        self.current().map(Palette::for_selection)
    }

    /// Apply the built-in palette for `selection` to every target.
    ///
    /// Runs inline when called on the UI thread, otherwise it is queued.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] if the UI thread's queue is gone.
    pub fn apply_palette(&self, selection: PaletteSelection) -> Result<(), DispatchError> {
        self.apply(None, selection, || true)
    }

    /// Switch every target to `style` and its implied palette.
    pub fn apply_style(&self, style: Style) -> Result<(), DispatchError> {
        self.apply(Some(style), style.palette(), || true)
    }

    /// Switch every target to `style` but apply `selection` instead of the
    /// style's own palette.
    ///
    /// Used while the palette follows the system preference.
    pub fn apply_style_with(
        &self,
        style: Style,
        selection: PaletteSelection,
    ) -> Result<(), DispatchError> {
        self.apply(Some(style), selection, || true)
    }

    /// Apply the palette matching a watcher event.
    ///
    /// Intended as a slot on [`PreferenceWatcher::changed`]. Dispatch
    /// failures are logged, since slots cannot return errors.
    ///
    /// [`PreferenceWatcher::changed`]: crate::platform::PreferenceWatcher::changed
    pub fn handle_change(&self, event: &ChangeEvent) {
        self.handle_change_while(event, || true);
    }

    /// Like [`handle_change`](Self::handle_change), but the palette is only
    /// applied if `still_current` holds when the invocation runs on the UI
    /// thread.
    ///
    /// An event queued from the watcher thread can reach the UI thread after
    /// the caller stopped following the system; `still_current` lets it be
    /// dropped there instead of overwriting a newer palette.
    pub fn handle_change_while<F>(&self, event: &ChangeEvent, still_current: F)
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let selection = PaletteSelection::from(event.preference);
        tracing::debug!(target: TARGET, ?event, %selection, "preference change received");
        if let Err(err) = self.apply(None, selection, still_current) {
            tracing::warn!(target: TARGET, error = %err, %selection, "could not apply palette");
        }
    }

    fn apply<F>(
        &self,
        style: Option<Style>,
        selection: PaletteSelection,
        still_current: F,
    ) -> Result<(), DispatchError>
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let targets = Arc::clone(&self.targets);
        let current = Arc::clone(&self.current);
        let applied = Arc::clone(&self.applied);

        self.dispatcher.invoke(move || {
            if !still_current() {
                tracing::debug!(target: TARGET, %selection, "stale palette change dropped");
                return;
            }
            let _span =
                tracing::debug_span!(target: TARGET, "apply_palette", %selection).entered();
            let palette = Palette::for_selection(selection);
            let targets: Vec<_> = targets.read().clone();

            for target in &targets {
                if let Some(style) = style {
                    target.apply_style(style.style_name());
                }
                target.apply_palette(&palette);
            }
            *current.lock() = Some(selection);

            tracing::info!(target: TARGET, %selection, targets = targets.len(), "palette applied");
            applied.emit(selection);
        })
    }
}

impl std::fmt::Debug for PaletteController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaletteController")
            .field("current", &self.current())
            .field("targets", &self.target_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ColorRole;
    use crate::platform::ThemePreference;
    use horizon_palette_core::DispatchQueue;

    #[derive(Default)]
    struct RecordingTarget {
        palettes: Mutex<Vec<(Palette, std::thread::ThreadId)>>,
        styles: Mutex<Vec<String>>,
    }

    impl PaletteTarget for RecordingTarget {
        fn apply_palette(&self, palette: &Palette) {
            self.palettes
                .lock()
                .push((palette.clone(), std::thread::current().id()));
        }

        fn apply_style(&self, style_name: &str) {
            self.styles.lock().push(style_name.to_string());
        }
    }

    #[test]
    fn test_apply_inline_on_ui_thread() {
        let queue = DispatchQueue::new();
        let controller = PaletteController::new(queue.dispatcher());
        let app = Arc::new(RecordingTarget::default());
        let tooltips = Arc::new(RecordingTarget::default());
        controller.add_target(app.clone());
        controller.add_target(tooltips.clone());

        controller.apply_palette(PaletteSelection::Dark).unwrap();

        assert_eq!(queue.pending_count(), 0);
        assert_eq!(controller.current(), Some(PaletteSelection::Dark));
        assert_eq!(app.palettes.lock()[0].0, Palette::dark());
        assert_eq!(tooltips.palettes.lock()[0].0, Palette::dark());
    }

    #[test]
    fn test_apply_from_other_thread_is_queued() {
        let queue = DispatchQueue::new();
        let controller = PaletteController::new(queue.dispatcher());
        let target = Arc::new(RecordingTarget::default());
        controller.add_target(target.clone());

        let remote = controller.clone();
        std::thread::spawn(move || {
            remote.handle_change(&ChangeEvent::transition(ThemePreference::Dark));
        })
        .join()
        .unwrap();

        assert!(target.palettes.lock().is_empty());
        assert_eq!(controller.current(), None);

        assert_eq!(queue.process_pending(), 1);
        let palettes = target.palettes.lock();
        assert_eq!(palettes.len(), 1);
        assert_eq!(palettes[0].1, std::thread::current().id());
        assert_eq!(
            palettes[0].0.active(ColorRole::Window),
            Palette::dark().active(ColorRole::Window)
        );
        assert_eq!(controller.current(), Some(PaletteSelection::Dark));
    }

    #[test]
    fn test_stale_change_dropped_on_ui_thread() {
        let queue = DispatchQueue::new();
        let controller = PaletteController::new(queue.dispatcher());
        let target = Arc::new(RecordingTarget::default());
        controller.add_target(target.clone());
        let current = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let remote = controller.clone();
        let guard = current.clone();
        std::thread::spawn(move || {
            remote.handle_change_while(&ChangeEvent::transition(ThemePreference::Dark), move || {
                guard.load(std::sync::atomic::Ordering::SeqCst)
            });
        })
        .join()
        .unwrap();

        current.store(false, std::sync::atomic::Ordering::SeqCst);
        controller.apply_palette(PaletteSelection::Light).unwrap();
        assert_eq!(queue.process_pending(), 1);

        assert_eq!(target.palettes.lock().len(), 1);
        assert_eq!(controller.current(), Some(PaletteSelection::Light));
    }

    #[test]
    fn test_apply_style_sets_style_then_palette() {
        let queue = DispatchQueue::new();
        let controller = PaletteController::new(queue.dispatcher());
        let target = Arc::new(RecordingTarget::default());
        controller.add_target(target.clone());

        controller.apply_style(Style::DarkFusion).unwrap();

        assert_eq!(*target.styles.lock(), vec!["Fusion".to_string()]);
        assert_eq!(controller.current(), Some(PaletteSelection::Dark));
    }

    #[test]
    fn test_apply_style_with_overrides_palette() {
        let queue = DispatchQueue::new();
        let controller = PaletteController::new(queue.dispatcher());
        let target = Arc::new(RecordingTarget::default());
        controller.add_target(target.clone());

        controller
            .apply_style_with(Style::Classic, PaletteSelection::Dark)
            .unwrap();

        assert_eq!(*target.styles.lock(), vec!["windows".to_string()]);
        assert_eq!(target.palettes.lock()[0].0, Palette::dark());
    }

    #[test]
    fn test_apply_after_queue_closed() {
        let queue = DispatchQueue::new();
        let controller = PaletteController::new(queue.dispatcher());
        drop(queue);

        let remote = controller.clone();
        let result = std::thread::spawn(move || remote.apply_palette(PaletteSelection::Light))
            .join()
            .unwrap();
        assert_eq!(result, Err(DispatchError::QueueClosed));
    }

    #[test]
    fn test_applied_signal() {
        let queue = DispatchQueue::new();
        let controller = PaletteController::new(queue.dispatcher());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        controller.applied().connect(move |selection| {
            seen_clone.lock().push(*selection);
        });

        controller.apply_palette(PaletteSelection::Light).unwrap();
        controller.apply_palette(PaletteSelection::Dark).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![PaletteSelection::Light, PaletteSelection::Dark]
        );
    }
}
