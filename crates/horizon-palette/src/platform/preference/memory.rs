//! In-process preference store.
//!
//! [`MemoryBackend`] behaves like a registry with single-shot change
//! notifications: every mutation of a path bumps that path's generation, and
//! an armed watch fires once the generation moves past the value it was armed
//! at. It also counts open watch handles and reads so callers can verify that
//! nothing leaks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{
    PreferenceBackend, PreferenceError, PreferenceLocation, StopSignal, ThemePreference,
    WaitOutcome,
};

#[derive(Default)]
struct KeyState {
    values: HashMap<String, bool>,
    generation: u64,
}

#[derive(Default)]
struct StoreState {
    keys: HashMap<String, KeyState>,
    denied: HashSet<String>,
    fail_watches: bool,
    open_handles: usize,
    peak_open_handles: usize,
    reads: usize,
}

impl StoreState {
    fn generation(&self, path: &str) -> u64 {
        self.keys.get(path).map_or(0, |key| key.generation)
    }
}

struct Shared {
    state: Mutex<StoreState>,
    cond: Condvar,
}

impl Shared {
    fn mutate(&self, path: &str, f: impl FnOnce(&mut KeyState)) {
        let mut state = self.state.lock();
        let key = state.keys.entry(path.to_string()).or_default();
        f(key);
        key.generation += 1;
        self.cond.notify_all();
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&StoreState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !done(&state) {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return done(&state);
            }
        }
        true
    }
}

/// An in-process preference store.
///
/// Clones share the same store, so a test can keep one clone to drive
/// changes while a watcher owns another.
///
/// ```
/// use horizon_palette::platform::{MemoryBackend, PreferenceBackend, PreferenceLocation};
///
/// let backend = MemoryBackend::new();
/// let location = PreferenceLocation::windows_personalize();
///
/// assert!(backend.read(&location).unwrap_err().is_not_found());
/// backend.set(&location, false);
/// assert!(backend.read(&location).unwrap().is_dark());
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MemoryBackend")
            .field("keys", &state.keys.len())
            .field("open_handles", &state.open_handles)
            .field("reads", &state.reads)
            .finish()
    }
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState::default()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Store the raw boolean for `location` and notify watchers of its path.
    ///
    /// Notifies even if the value did not change, the way a coarse OS
    /// change-class signal does.
    pub fn set(&self, location: &PreferenceLocation, value: bool) {
        self.shared.mutate(&location.path, |key| {
            key.values.insert(location.value_name.clone(), value);
        });
    }

    /// Store the value that `location.sense` maps to `preference`.
    pub fn set_preference(&self, location: &PreferenceLocation, preference: ThemePreference) {
        self.set(location, location.sense.encode(preference));
    }

    /// Notify watchers of the path without touching any value.
    pub fn touch(&self, location: &PreferenceLocation) {
        self.shared.mutate(&location.path, |_| {});
    }

    /// Remove the value so that reads fail with `NotFound`.
    pub fn remove(&self, location: &PreferenceLocation) {
        self.shared.mutate(&location.path, |key| {
            key.values.remove(&location.value_name);
        });
    }

    /// Deny (or re-allow) query and notify access to the path.
    pub fn deny(&self, location: &PreferenceLocation, denied: bool) {
        let mut state = self.shared.state.lock();
        if denied {
            state.denied.insert(location.path.clone());
        } else {
            state.denied.remove(&location.path);
        }
    }

    /// Make every subsequent `open_watch` fail with a platform error.
    pub fn fail_watches(&self, fail: bool) {
        self.shared.state.lock().fail_watches = fail;
    }

    /// Number of watch handles currently open.
    pub fn open_handles(&self) -> usize {
        self.shared.state.lock().open_handles
    }

    /// Most watch handles ever open at the same time.
    pub fn peak_open_handles(&self) -> usize {
        self.shared.state.lock().peak_open_handles
    }

    /// Number of reads served so far, successful or not.
    pub fn reads(&self) -> usize {
        self.shared.state.lock().reads
    }

    /// Block until exactly `count` watch handles are open.
    ///
    /// Returns false on timeout.
    pub fn wait_for_open_handles(&self, count: usize, timeout: Duration) -> bool {
        self.shared
            .wait_until(timeout, |state| state.open_handles == count)
    }

    /// Block until at least `count` reads have been served.
    ///
    /// Returns false on timeout.
    pub fn wait_for_reads(&self, count: usize, timeout: Duration) -> bool {
        self.shared.wait_until(timeout, |state| state.reads >= count)
    }
}

impl PreferenceBackend for MemoryBackend {
    type Watch = MemoryWatch;
    type Stop = MemoryStop;

    fn read(&self, location: &PreferenceLocation) -> Result<ThemePreference, PreferenceError> {
        let mut state = self.shared.state.lock();
        state.reads += 1;
        self.shared.cond.notify_all();

        if state.denied.contains(&location.path) {
            return Err(PreferenceError::access_denied(location));
        }
        state
            .keys
            .get(&location.path)
            .and_then(|key| key.values.get(&location.value_name))
            .map(|&value| location.sense.interpret(value))
            .ok_or_else(|| PreferenceError::not_found(location))
    }

    fn stop_signal(&self) -> Result<MemoryStop, PreferenceError> {
        Ok(MemoryStop {
            shared: Arc::clone(&self.shared),
            raised: AtomicBool::new(false),
        })
    }

    fn open_watch(&self, location: &PreferenceLocation) -> Result<MemoryWatch, PreferenceError> {
        let mut state = self.shared.state.lock();
        if state.fail_watches {
            return Err(PreferenceError::platform(format!(
                "cannot open change notification for {location}"
            )));
        }
        if state.denied.contains(&location.path) {
            return Err(PreferenceError::access_denied(location));
        }

        state.open_handles += 1;
        state.peak_open_handles = state.peak_open_handles.max(state.open_handles);
        self.shared.cond.notify_all();
        Ok(MemoryWatch {
            shared: Arc::clone(&self.shared),
            path: location.path.clone(),
            armed_at: state.generation(&location.path),
        })
    }

    fn wait(&self, watch: &mut MemoryWatch, stop: &MemoryStop) -> Result<WaitOutcome, PreferenceError> {
        let mut state = self.shared.state.lock();
        loop {
            if stop.is_raised() {
                return Ok(WaitOutcome::Stopped);
            }
            if state.generation(&watch.path) != watch.armed_at {
                return Ok(WaitOutcome::Changed);
            }
            self.shared.cond.wait(&mut state);
        }
    }

    fn rearm(&self, watch: &mut MemoryWatch) -> Result<(), PreferenceError> {
        let state = self.shared.state.lock();
        watch.armed_at = state.generation(&watch.path);
        Ok(())
    }
}

/// An open watch on a [`MemoryBackend`] path.
pub struct MemoryWatch {
    shared: Arc<Shared>,
    path: String,
    armed_at: u64,
}

impl Drop for MemoryWatch {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.open_handles -= 1;
        self.shared.cond.notify_all();
    }
}

/// Stop signal for [`MemoryBackend`] waits.
pub struct MemoryStop {
    shared: Arc<Shared>,
    raised: AtomicBool,
}

impl StopSignal for MemoryStop {
    fn raise(&self) {
        // Taken under the store lock so a waiter cannot check the flag and then
        // park after the notification was sent.
        let _state = self.shared.state.lock();
        self.raised.store(true, Ordering::SeqCst);
        self.shared.cond.notify_all();
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> PreferenceLocation {
        PreferenceLocation::windows_personalize()
    }

    #[test]
    fn test_read_values() {
        let backend = MemoryBackend::new();
        let location = location();

        assert!(backend.read(&location).unwrap_err().is_not_found());
        backend.set(&location, true);
        assert_eq!(backend.read(&location), Ok(ThemePreference::Light));

        backend.deny(&location, true);
        assert!(backend.read(&location).unwrap_err().is_access_denied());
        backend.deny(&location, false);

        backend.remove(&location);
        assert!(backend.read(&location).unwrap_err().is_not_found());
        assert_eq!(backend.reads(), 4);
    }

    #[test]
    fn test_watch_fires_once_until_rearmed() {
        let backend = MemoryBackend::new();
        let location = location();
        backend.set(&location, true);

        let stop = backend.stop_signal().unwrap();
        let mut watch = backend.open_watch(&location).unwrap();
        assert_eq!(backend.open_handles(), 1);

        backend.touch(&location);
        assert_eq!(backend.wait(&mut watch, &stop), Ok(WaitOutcome::Changed));
        // Not rearmed yet, so the same notification is still pending.
        assert_eq!(backend.wait(&mut watch, &stop), Ok(WaitOutcome::Changed));

        backend.rearm(&mut watch).unwrap();
        stop.raise();
        assert_eq!(backend.wait(&mut watch, &stop), Ok(WaitOutcome::Stopped));

        drop(watch);
        assert_eq!(backend.open_handles(), 0);
        assert_eq!(backend.peak_open_handles(), 1);
    }

    #[test]
    fn test_stop_wins_over_pending_change() {
        let backend = MemoryBackend::new();
        let location = location();
        let stop = backend.stop_signal().unwrap();
        let mut watch = backend.open_watch(&location).unwrap();

        backend.touch(&location);
        stop.raise();
        assert_eq!(backend.wait(&mut watch, &stop), Ok(WaitOutcome::Stopped));
    }

    #[test]
    fn test_stop_wakes_blocked_wait() {
        let backend = MemoryBackend::new();
        let location = location();
        let stop = Arc::new(backend.stop_signal().unwrap());
        let mut watch = backend.open_watch(&location).unwrap();

        let waiter = {
            let backend = backend.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || backend.wait(&mut watch, &stop))
        };

        stop.raise();
        assert_eq!(waiter.join().unwrap(), Ok(WaitOutcome::Stopped));
        assert!(backend.wait_for_open_handles(0, Duration::from_secs(5)));
    }

    #[test]
    fn test_other_paths_do_not_fire() {
        let backend = MemoryBackend::new();
        let watched = location();
        let other = PreferenceLocation::gtk_settings("/etc/gtk-3.0/settings.ini");
        let stop = backend.stop_signal().unwrap();
        let mut watch = backend.open_watch(&watched).unwrap();

        backend.set(&other, true);
        stop.raise();
        assert_eq!(backend.wait(&mut watch, &stop), Ok(WaitOutcome::Stopped));
    }

    #[test]
    fn test_failed_watch_does_not_count() {
        let backend = MemoryBackend::new();
        backend.fail_watches(true);
        assert!(backend.open_watch(&location()).is_err());
        assert_eq!(backend.open_handles(), 0);
    }
}
