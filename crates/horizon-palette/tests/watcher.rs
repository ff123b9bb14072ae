//! Lifecycle and de-duplication tests for the preference watcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use horizon_palette::platform::{
    ChangeEvent, ChangeKind, MemoryBackend, PreferenceError, PreferenceLocation, PreferenceSense,
    PreferenceWatcher, ThemePreference, WatcherStatus,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(50);

/// Reads served by the time a freshly started loop is armed: the initial
/// read in `start` and the loop's catch-up read.
const READS_WHEN_ARMED: usize = 2;

fn personalize(backend: &MemoryBackend, is_light: bool) -> PreferenceLocation {
    let location = PreferenceLocation::windows_personalize();
    backend.set(&location, is_light);
    location
}

fn record(watcher: &PreferenceWatcher<MemoryBackend>) -> Receiver<ChangeEvent> {
    let (tx, rx) = unbounded();
    watcher.on_change(move |event| {
        let _ = tx.send(*event);
    });
    rx
}

fn record_errors(watcher: &PreferenceWatcher<MemoryBackend>) -> Receiver<PreferenceError> {
    let (tx, rx) = unbounded();
    watcher.errors().connect(move |err| {
        let _ = tx.send(err.clone());
    });
    rx
}

fn backend_wait_reads(backend: &MemoryBackend, count: usize) {
    assert!(backend.wait_for_reads(count, TIMEOUT), "waiting for {count} reads");
}

/// Deterministic pseudo-random light/dark sequence.
fn sequence(seed: u64, len: usize) -> Vec<bool> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) & 1 == 1
        })
        .collect()
}

#[test]
fn test_events_are_deduplicated_reads() {
    for seed in [1, 7, 42, 1234, 98765] {
        let values = sequence(seed, 24);
        let backend = MemoryBackend::new();
        let location = personalize(&backend, values[0]);
        let watcher = PreferenceWatcher::new(backend.clone());
        let rx = record(&watcher);

        watcher.start(&location).unwrap();
        assert!(backend.wait_for_reads(READS_WHEN_ARMED, TIMEOUT));

        // One write, one notification, one read: wait for each before the next.
        for (i, &value) in values.iter().enumerate().skip(1) {
            backend.set(&location, value);
            assert!(backend.wait_for_reads(READS_WHEN_ARMED + i, TIMEOUT));
        }
        watcher.stop();

        let mut expected = vec![ChangeEvent::initial(ThemePreference::from_is_light(values[0]))];
        for pair in values.windows(2) {
            if pair[0] != pair[1] {
                expected.push(ChangeEvent::transition(ThemePreference::from_is_light(pair[1])));
            }
        }

        let received: Vec<ChangeEvent> = rx.try_iter().collect();
        assert_eq!(received, expected, "seed {seed}");
    }
}

#[test]
fn test_light_unchanged_dark() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    let watcher = PreferenceWatcher::new(backend.clone());
    let rx = record(&watcher);

    watcher.start(&location).unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        ChangeEvent::initial(ThemePreference::Light)
    );
    assert!(backend.wait_for_reads(READS_WHEN_ARMED, TIMEOUT));

    // Rewriting the same value notifies but must not emit.
    backend.set(&location, true);
    assert!(backend.wait_for_reads(READS_WHEN_ARMED + 1, TIMEOUT));

    backend.set(&location, false);
    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        ChangeEvent::transition(ThemePreference::Dark)
    );

    watcher.stop();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_double_start_is_a_noop() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, false);
    let watcher = PreferenceWatcher::new(backend.clone());
    let rx = record(&watcher);

    watcher.start(&location).unwrap();
    watcher.start(&location).unwrap();
    assert!(backend.wait_for_open_handles(1, TIMEOUT));

    let initials: Vec<_> = rx.try_iter().collect();
    assert_eq!(initials, vec![ChangeEvent::initial(ThemePreference::Dark)]);

    std::thread::sleep(QUIET);
    assert_eq!(backend.open_handles(), 1);

    watcher.stop();
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_stop_before_start_is_a_noop() {
    let backend = MemoryBackend::new();
    let watcher = PreferenceWatcher::new(backend.clone());

    watcher.stop();
    watcher.stop();

    assert_eq!(watcher.status(), WatcherStatus::Stopped);
    assert_eq!(backend.open_handles(), 0);
    assert_eq!(backend.reads(), 0);
}

#[test]
fn test_stop_releases_handle_before_returning() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    let watcher = PreferenceWatcher::new(backend.clone());

    for _ in 0..10 {
        watcher.start(&location).unwrap();
        assert!(backend.wait_for_open_handles(1, TIMEOUT));
        watcher.stop();
        assert_eq!(backend.open_handles(), 0);
        assert_eq!(watcher.status(), WatcherStatus::Stopped);
    }
}

#[test]
fn test_start_then_immediate_stop() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    let watcher = PreferenceWatcher::new(backend.clone());

    for _ in 0..50 {
        watcher.start(&location).unwrap();
        watcher.stop();
        assert_eq!(backend.open_handles(), 0);
    }
}

#[test]
fn test_start_waits_for_loop_stopped_from_its_own_slot() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    let watcher = Arc::new(PreferenceWatcher::new(backend.clone()));
    let (stopped_tx, stopped_rx) = unbounded();
    let (release_tx, release_rx) = unbounded::<()>();

    // The first transition stops the watcher from its own thread, then keeps
    // the loop busy until released.
    let weak = Arc::downgrade(&watcher);
    let blocked_once = AtomicBool::new(false);
    watcher.on_change(move |event| {
        if event.kind != ChangeKind::Transition || blocked_once.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(watcher) = weak.upgrade() {
            watcher.stop();
            let _ = stopped_tx.send(watcher.status());
            let _ = release_rx.recv_timeout(TIMEOUT);
        }
    });

    watcher.start(&location).unwrap();
    backend.set(&location, false);
    assert_eq!(stopped_rx.recv_timeout(TIMEOUT).unwrap(), WatcherStatus::Stopped);

    std::thread::scope(|scope| {
        let starter = scope.spawn(|| watcher.start(&location));

        // The detached loop still holds its watch while its slot runs.
        std::thread::sleep(QUIET);
        assert_eq!(backend.open_handles(), 1);

        release_tx.send(()).unwrap();
        starter.join().unwrap().unwrap();
    });

    assert!(watcher.is_running());
    assert!(backend.wait_for_open_handles(1, TIMEOUT));
    assert_eq!(backend.peak_open_handles(), 1);
    assert_eq!(watcher.last_observed(), Some(ThemePreference::Dark));

    watcher.stop();
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_not_found_on_start() {
    let backend = MemoryBackend::new();
    let location = PreferenceLocation::windows_personalize();
    let watcher = PreferenceWatcher::new(backend.clone());
    let rx = record(&watcher);

    let err = watcher.start(&location).unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(watcher.status(), WatcherStatus::Stopped);
    assert_eq!(watcher.last_observed(), None);
    assert!(rx.try_recv().is_err());
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_access_denied_on_start() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    backend.deny(&location, true);
    let watcher = PreferenceWatcher::new(backend.clone());

    let err = watcher.start(&location).unwrap_err();
    assert!(err.is_access_denied());
    assert!(!watcher.is_running());
}

#[test]
fn test_independent_watchers() {
    let backend = MemoryBackend::new();
    let first = personalize(&backend, true);
    let second = PreferenceLocation::new(
        "Software\\Other\\Personalize",
        "SystemUsesLightTheme",
        PreferenceSense::TruthyIsLight,
    );
    backend.set(&second, true);

    let watcher_a = PreferenceWatcher::new(backend.clone());
    let watcher_b = PreferenceWatcher::new(backend.clone());
    let rx_a = record(&watcher_a);
    let rx_b = record(&watcher_b);

    watcher_a.start(&first).unwrap();
    watcher_b.start(&second).unwrap();
    assert!(backend.wait_for_open_handles(2, TIMEOUT));
    assert_eq!(rx_a.try_recv().unwrap().kind, ChangeKind::Initial);
    assert_eq!(rx_b.try_recv().unwrap().kind, ChangeKind::Initial);

    backend.set(&first, false);
    assert_eq!(
        rx_a.recv_timeout(TIMEOUT).unwrap(),
        ChangeEvent::transition(ThemePreference::Dark)
    );

    watcher_a.stop();
    assert_eq!(backend.open_handles(), 1);
    assert!(watcher_b.is_running());

    backend.set(&second, false);
    assert_eq!(
        rx_b.recv_timeout(TIMEOUT).unwrap(),
        ChangeEvent::transition(ThemePreference::Dark)
    );
    assert!(rx_a.try_recv().is_err());

    watcher_b.stop();
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_watch_failure_stops_loop_and_reports() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    backend.fail_watches(true);
    let watcher = PreferenceWatcher::new(backend.clone());
    let errors = record_errors(&watcher);

    watcher.start(&location).unwrap();

    let err = errors.recv_timeout(TIMEOUT).unwrap();
    assert!(matches!(err, PreferenceError::Platform { .. }));
    assert_eq!(watcher.status(), WatcherStatus::Stopped);
    assert_eq!(backend.open_handles(), 0);

    // A later start works once watches can be opened again.
    backend.fail_watches(false);
    watcher.start(&location).unwrap();
    assert!(backend.wait_for_open_handles(1, TIMEOUT));
    assert!(watcher.is_running());
    watcher.stop();
    assert!(errors.try_recv().is_err());
}

#[test]
fn test_read_failures_reported_once_per_streak() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    let watcher = PreferenceWatcher::new(backend.clone());
    let events = record(&watcher);
    let errors = record_errors(&watcher);

    watcher.start(&location).unwrap();
    assert!(backend.wait_for_reads(READS_WHEN_ARMED, TIMEOUT));

    backend.remove(&location);
    backend_wait_reads(&backend, READS_WHEN_ARMED + 1);
    backend.touch(&location);
    backend_wait_reads(&backend, READS_WHEN_ARMED + 2);
    backend.touch(&location);
    backend_wait_reads(&backend, READS_WHEN_ARMED + 3);

    assert!(errors.recv_timeout(TIMEOUT).unwrap().is_not_found());
    assert!(errors.try_recv().is_err());
    assert!(watcher.is_running());

    // Recovery ends the streak; the loop keeps going.
    backend.set(&location, false);
    assert_eq!(
        events.recv_timeout(TIMEOUT).unwrap().kind,
        ChangeKind::Initial
    );
    assert_eq!(
        events.recv_timeout(TIMEOUT).unwrap(),
        ChangeEvent::transition(ThemePreference::Dark)
    );

    backend.remove(&location);
    assert!(errors.recv_timeout(TIMEOUT).unwrap().is_not_found());

    watcher.stop();
}

#[test]
fn test_restart_emits_fresh_initial() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    let watcher = PreferenceWatcher::new(backend.clone());
    let rx = record(&watcher);

    watcher.start(&location).unwrap();
    watcher.stop();

    backend.set(&location, false);
    watcher.start(&location).unwrap();
    watcher.stop();

    let received: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        received,
        vec![
            ChangeEvent::initial(ThemePreference::Light),
            ChangeEvent::initial(ThemePreference::Dark),
        ]
    );
}

#[test]
fn test_fan_out_to_many_subscribers() {
    let backend = MemoryBackend::new();
    let location = personalize(&backend, true);
    let watcher = Arc::new(PreferenceWatcher::new(backend.clone()));
    let receivers: Vec<_> = (0..3).map(|_| record(&watcher)).collect();

    watcher.start(&location).unwrap();
    backend.set(&location, false);
    backend.set_preference(&location, ThemePreference::Light);

    for rx in &receivers {
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().kind, ChangeKind::Initial);
        // Intermediate values may coalesce; whatever arrives ends on light.
        let mut last = None;
        while let Ok(event) = rx.recv_timeout(QUIET * 4) {
            assert_eq!(event.kind, ChangeKind::Transition);
            last = Some(event.preference);
        }
        assert!(matches!(last, None | Some(ThemePreference::Light)));
    }
    watcher.stop();
}
