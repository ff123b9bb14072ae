//! Watching the system light/dark preference.
//!
//! [`PreferenceWatcher`] turns a backend's coarse "something under this
//! location changed" notifications into [`ChangeEvent`]s that fire only when
//! the light/dark value actually flips.
//!
//! # Lifecycle
//!
//! ```
//! use std::time::Duration;
//! use horizon_palette::platform::{
//!     ChangeKind, MemoryBackend, PreferenceLocation, PreferenceWatcher, ThemePreference,
//! };
//!
//! let backend = MemoryBackend::new();
//! let location = PreferenceLocation::windows_personalize();
//! backend.set(&location, true);
//!
//! let watcher = PreferenceWatcher::new(backend.clone());
//! let (tx, rx) = crossbeam_channel::unbounded();
//! watcher.on_change(move |event| {
//!     let _ = tx.send(*event);
//! });
//!
//! // The initial state is delivered before `start` returns.
//! watcher.start(&location).unwrap();
//! assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Initial);
//!
//! backend.set(&location, false);
//! let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
//! assert_eq!(event.preference, ThemePreference::Dark);
//!
//! watcher.stop();
//! assert_eq!(backend.open_handles(), 0);
//! ```
//!
//! # Threads
//!
//! - `Initial` events are delivered on the thread calling [`start`].
//! - `Transition` events and loop errors are delivered on the watcher's
//!   own thread, named `horizon-palette-watcher`.
//!
//! Use [`Signal::connect_queued`] to receive them on another thread instead.
//!
//! [`start`]: PreferenceWatcher::start

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use horizon_palette_core::logging::targets;
use horizon_palette_core::{ConnectionId, Signal};
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::preference::{
    PreferenceBackend, PreferenceError, PreferenceLocation, StopSignal, ThemePreference,
    WaitOutcome,
};

const TARGET: &str = targets::WATCHER;

/// Name given to every watcher thread.
pub const WATCHER_THREAD_NAME: &str = "horizon-palette-watcher";

/// Whether an event reports the starting state or a detected flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The state read when the watcher started. Not necessarily a change.
    Initial,
    /// The preference differs from the previously delivered one.
    Transition,
}

/// A preference delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// The preference now in effect.
    pub preference: ThemePreference,
    /// Why it is being delivered.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// An event reporting the starting state.
    pub fn initial(preference: ThemePreference) -> Self {
        Self {
            preference,
            kind: ChangeKind::Initial,
        }
    }

    /// An event reporting a detected flip.
    pub fn transition(preference: ThemePreference) -> Self {
        Self {
            preference,
            kind: ChangeKind::Transition,
        }
    }

    /// Returns true for the event emitted by `start`.
    pub fn is_initial(&self) -> bool {
        self.kind == ChangeKind::Initial
    }
}

/// Run state of a watcher's background loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherStatus {
    /// No loop, no open watch.
    Stopped,
    /// A loop is (being) started and owns the watch.
    Running,
}

struct LoopHandle<S> {
    stop: Arc<S>,
    thread: JoinHandle<()>,
    finished: Arc<AtomicBool>,
    location: PreferenceLocation,
}

impl<S> LoopHandle<S> {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn on_current_thread(&self) -> bool {
        self.thread.thread().id() == thread::current().id()
    }
}

enum Phase<S> {
    Stopped,
    /// Between the initial read and the loop spawn; the initial event is
    /// being delivered with no lock held.
    Starting,
    Running(LoopHandle<S>),
    /// Told to stop from a slot on its own thread, which cannot join itself.
    /// The loop still owns its watch until the slot returns; the next
    /// `start` or `stop` from another thread joins it.
    Detached(LoopHandle<S>),
    /// A loop is being joined with the lock released.
    Stopping { thread: ThreadId },
}

struct Lifecycle<S> {
    phase: Phase<S>,
    /// Bumped on every start so a start interrupted by stop/start during its
    /// initial emission can tell it lost the race.
    generation: u64,
}

/// Everything the loop thread shares with the watcher.
struct LoopContext<B: PreferenceBackend> {
    backend: Arc<B>,
    location: PreferenceLocation,
    stop: Arc<B::Stop>,
    finished: Arc<AtomicBool>,
    changed: Arc<Signal<ChangeEvent>>,
    errors: Arc<Signal<PreferenceError>>,
    last_observed: Arc<Mutex<Option<ThemePreference>>>,
}

/// Watches one preference location and republishes light/dark flips.
///
/// Each instance owns at most one background thread and one open watch.
/// Independent instances share nothing.
pub struct PreferenceWatcher<B: PreferenceBackend> {
    backend: Arc<B>,
    changed: Arc<Signal<ChangeEvent>>,
    errors: Arc<Signal<PreferenceError>>,
    last_observed: Arc<Mutex<Option<ThemePreference>>>,
    lifecycle: Mutex<Lifecycle<B::Stop>>,
    /// Notified whenever a `Stopping` phase ends.
    settled: Condvar,
}

impl<B: PreferenceBackend> PreferenceWatcher<B> {
    /// Create a stopped watcher over `backend`.
    pub fn new(backend: B) -> Self {
        Self::with_shared_backend(Arc::new(backend))
    }

    /// Create a stopped watcher over a backend shared with other owners.
    pub fn with_shared_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            changed: Arc::new(Signal::new()),
            errors: Arc::new(Signal::new()),
            last_observed: Arc::new(Mutex::new(None)),
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Stopped,
                generation: 0,
            }),
            settled: Condvar::new(),
        }
    }

    /// The backend this watcher reads from.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Signal emitted with every initial state and every transition.
    ///
    /// Successive events reach a given slot in detection order.
    pub fn changed(&self) -> &Signal<ChangeEvent> {
        &self.changed
    }

    /// Signal emitted when the background loop hits an error.
    ///
    /// Open, wait and re-arm failures end the loop. Read failures after a
    /// notification are reported once per run of consecutive failures and
    /// the loop keeps waiting.
    pub fn errors(&self) -> &Signal<PreferenceError> {
        &self.errors
    }

    /// Connect a single callback to [`changed`](Self::changed).
    pub fn on_change<F>(&self, f: F) -> ConnectionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.changed.connect(f)
    }

    /// The last preference delivered to subscribers.
    ///
    /// Survives `stop` until the next `start` replaces it.
    pub fn last_observed(&self) -> Option<ThemePreference> {
        *self.last_observed.lock()
    }

    /// Current run state.
    pub fn status(&self) -> WatcherStatus {
        match &self.lifecycle.lock().phase {
            Phase::Starting => WatcherStatus::Running,
            Phase::Running(handle) if !handle.is_finished() => WatcherStatus::Running,
            _ => WatcherStatus::Stopped,
        }
    }

    /// Returns true if a loop is running.
    pub fn is_running(&self) -> bool {
        self.status() == WatcherStatus::Running
    }

    /// The location being watched, if running.
    pub fn location(&self) -> Option<PreferenceLocation> {
        match &self.lifecycle.lock().phase {
            Phase::Running(handle) if !handle.is_finished() => Some(handle.location.clone()),
            _ => None,
        }
    }

    /// Start watching `location`.
    ///
    /// Does nothing if already running. Otherwise reads the current
    /// preference, delivers it as a [`ChangeKind::Initial`] event on this
    /// thread, and launches the background loop.
    ///
    /// # Errors
    ///
    /// Returns the read error (typically `NotFound` or `AccessDenied`) if
    /// the initial read fails. No event is emitted and no loop is created.
    pub fn start(&self, location: &PreferenceLocation) -> Result<(), PreferenceError> {
        let (generation, preference, stop) = {
            let mut lifecycle = self.lifecycle.lock();
            if !self.settle(&mut lifecycle) {
                tracing::debug!(target: TARGET, "start requested while stopping from the watcher thread");
                return Ok(());
            }

            match std::mem::replace(&mut lifecycle.phase, Phase::Stopped) {
                Phase::Stopped => {}
                Phase::Detached(handle) if handle.on_current_thread() => {
                    lifecycle.phase = Phase::Detached(handle);
                    tracing::debug!(target: TARGET, "start requested from a detached watcher thread");
                    return Ok(());
                }
                Phase::Detached(handle) => self.join_loop(&mut lifecycle, handle),
                Phase::Running(handle) if handle.is_finished() => {
                    // A loop reporting its own fatal error is past its watch.
                    if !handle.on_current_thread() {
                        self.join_loop(&mut lifecycle, handle);
                    }
                }
                running => {
                    lifecycle.phase = running;
                    return Ok(());
                }
            }

            let preference = self.backend.read(location)?;
            let stop = Arc::new(self.backend.stop_signal()?);

            lifecycle.generation += 1;
            lifecycle.phase = Phase::Starting;
            *self.last_observed.lock() = Some(preference);
            (lifecycle.generation, preference, stop)
        };

        tracing::info!(target: TARGET, %location, %preference, "preference watcher starting");
        self.changed.emit(ChangeEvent::initial(preference));

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation || !matches!(lifecycle.phase, Phase::Starting) {
            tracing::debug!(target: TARGET, "watcher stopped during initial delivery");
            return Ok(());
        }

        match self.spawn_loop(location, stop) {
            Ok(handle) => {
                lifecycle.phase = Phase::Running(handle);
                Ok(())
            }
            Err(err) => {
                lifecycle.phase = Phase::Stopped;
                Err(err)
            }
        }
    }

    /// Stop watching.
    ///
    /// Does nothing if not running. Otherwise wakes the loop, waits for it to
    /// exit and release its watch, then returns. Never fails.
    ///
    /// Called from a slot running on the watcher thread itself, the loop is
    /// told to stop and detached instead of joined; it exits as soon as the
    /// slot returns. The status reads `Stopped` from then on, and a `start`
    /// from another thread waits for the detached loop to exit first.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if !self.settle(&mut lifecycle) {
            return;
        }

        let handle = match std::mem::replace(&mut lifecycle.phase, Phase::Stopped) {
            Phase::Running(handle) => handle,
            Phase::Detached(handle) if !handle.on_current_thread() => handle,
            Phase::Starting => {
                tracing::debug!(target: TARGET, "start cancelled before the loop was spawned");
                return;
            }
            other => {
                lifecycle.phase = other;
                return;
            }
        };

        handle.stop.raise();
        if handle.on_current_thread() {
            tracing::warn!(
                target: TARGET,
                "stop requested from the watcher thread; detaching the loop"
            );
            lifecycle.phase = Phase::Detached(handle);
            return;
        }

        let location = handle.location.clone();
        self.join_loop(&mut lifecycle, handle);
        tracing::info!(target: TARGET, %location, "preference watcher stopped");
    }

    /// Join a loop thread other than the caller's, with the lock released.
    ///
    /// Leaves the phase `Stopped` and wakes anyone settling on it.
    fn join_loop(
        &self,
        lifecycle: &mut MutexGuard<'_, Lifecycle<B::Stop>>,
        handle: LoopHandle<B::Stop>,
    ) {
        lifecycle.phase = Phase::Stopping {
            thread: handle.thread.thread().id(),
        };
        let joined = MutexGuard::unlocked(lifecycle, || handle.thread.join());
        if joined.is_err() {
            tracing::error!(target: TARGET, "preference watcher thread panicked");
        }

        lifecycle.phase = Phase::Stopped;
        self.settled.notify_all();
    }

    /// Wait out a concurrent `stop`.
    ///
    /// Returns false if the caller is the thread being stopped, which must
    /// not block on its own join.
    fn settle(&self, lifecycle: &mut MutexGuard<'_, Lifecycle<B::Stop>>) -> bool {
        while let Phase::Stopping { thread } = lifecycle.phase {
            if thread == thread::current().id() {
                return false;
            }
            self.settled.wait(lifecycle);
        }
        true
    }

    fn spawn_loop(
        &self,
        location: &PreferenceLocation,
        stop: Arc<B::Stop>,
    ) -> Result<LoopHandle<B::Stop>, PreferenceError> {
        let finished = Arc::new(AtomicBool::new(false));
        let context = LoopContext {
            backend: Arc::clone(&self.backend),
            location: location.clone(),
            stop: Arc::clone(&stop),
            finished: Arc::clone(&finished),
            changed: Arc::clone(&self.changed),
            errors: Arc::clone(&self.errors),
            last_observed: Arc::clone(&self.last_observed),
        };

        let thread = thread::Builder::new()
            .name(WATCHER_THREAD_NAME.to_string())
            .spawn(move || watch_loop(context))
            .map_err(|e| PreferenceError::platform(format!("failed to spawn watcher thread: {e}")))?;

        Ok(LoopHandle {
            stop,
            thread,
            finished,
            location: location.clone(),
        })
    }
}

impl<B: PreferenceBackend> Drop for PreferenceWatcher<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: PreferenceBackend> std::fmt::Debug for PreferenceWatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceWatcher")
            .field("status", &self.status())
            .field("last_observed", &self.last_observed())
            .field("subscribers", &self.changed.connection_count())
            .finish()
    }
}

fn watch_loop<B: PreferenceBackend>(context: LoopContext<B>) {
    let _span = tracing::debug_span!(
        target: TARGET,
        "watch_loop",
        location = %context.location
    )
    .entered();

    let result = run_loop(&context);
    context.finished.store(true, Ordering::SeqCst);

    match result {
        Ok(()) => tracing::debug!(target: TARGET, "watch loop exited"),
        Err(err) => {
            tracing::error!(target: TARGET, error = %err, "watch loop failed");
            context.errors.emit(err);
        }
    }
}

/// Wait, re-arm, read, compare, emit; until stopped or a watch error.
///
/// The watch is dropped, and its OS resources released, on every return.
fn run_loop<B: PreferenceBackend>(context: &LoopContext<B>) -> Result<(), PreferenceError> {
    let backend = &*context.backend;
    let mut watch = backend.open_watch(&context.location)?;
    let mut read_failing = false;

    // Changes between the initial read in `start` and arming the watch raise
    // no notification.
    observe(context, &mut read_failing);

    loop {
        match backend.wait(&mut watch, &context.stop)? {
            WaitOutcome::Stopped => return Ok(()),
            WaitOutcome::Changed => {}
        }

        // Re-arm before reading so a change landing after the read still
        // fires the next wait.
        backend.rearm(&mut watch)?;
        observe(context, &mut read_failing);
    }
}

/// Read the preference and emit a transition if it differs from the last one.
fn observe<B: PreferenceBackend>(context: &LoopContext<B>, read_failing: &mut bool) {
    let preference = match context.backend.read(&context.location) {
        Ok(preference) => {
            if *read_failing {
                tracing::info!(target: TARGET, "preference readable again");
            }
            *read_failing = false;
            preference
        }
        Err(err) => {
            if !*read_failing {
                *read_failing = true;
                tracing::warn!(target: TARGET, error = %err, "failed to read preference");
                context.errors.emit(err);
            }
            return;
        }
    };

    let flipped = {
        let mut last = context.last_observed.lock();
        if *last == Some(preference) {
            false
        } else {
            *last = Some(preference);
            true
        }
    };

    if flipped {
        tracing::info!(target: TARGET, %preference, "system preference changed");
        context.changed.emit(ChangeEvent::transition(preference));
    } else {
        tracing::trace!(target: TARGET, %preference, "notification without a value change");
    }
}
