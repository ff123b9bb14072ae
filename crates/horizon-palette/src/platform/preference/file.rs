//! Key-file preference locations.
//!
//! Desktop environments that keep their theme preference in an INI-style
//! file (GTK's `settings.ini`) are watched with `notify`. The parent
//! directory is watched rather than the file, so editors and settings daemons
//! that replace the file with a rename are still observed.

use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use horizon_palette_core::logging::targets;
use ini::Ini;
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::{
    PreferenceBackend, PreferenceError, PreferenceLocation, StopSignal, ThemePreference,
    WaitOutcome, parse_truthy,
};
use crate::file::{FileError, FileErrorKind, atomic_write, read_text};

const TARGET: &str = targets::WATCHER;

/// Section new keys are written to when the file has no matching key yet.
const DEFAULT_SECTION: &str = "Settings";

/// Preference backend for INI-style key files.
///
/// The value is looked up by name in every section, first match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackend;

impl FileBackend {
    /// Create a file backend.
    pub fn new() -> Self {
        Self
    }

    /// Write `preference` into the key file, keeping every other entry.
    ///
    /// The file is replaced atomically, which watchers see as a change.
    pub fn write(
        &self,
        location: &PreferenceLocation,
        preference: ThemePreference,
    ) -> Result<(), PreferenceError> {
        let mut ini = match read_text(&location.path) {
            Ok(content) => Ini::load_from_str(&content).map_err(|e| parse_error(location, e))?,
            Err(err) if err.is_not_found() => Ini::new(),
            Err(err) => return Err(file_error(err, location)),
        };

        let section = ini
            .iter()
            .find(|(_, props)| props.contains_key(&location.value_name))
            .map(|(section, _)| section.map(str::to_string))
            .unwrap_or_else(|| Some(DEFAULT_SECTION.to_string()));

        let value = if location.sense.encode(preference) { "1" } else { "0" };
        ini.with_section(section).set(location.value_name.as_str(), value);

        atomic_write(&location.path, |writer| {
            ini.write_to(writer)
                .map_err(|e| FileError::from_io(e, &location.path))
        })
        .map_err(|err| file_error(err, location))
    }
}

impl PreferenceBackend for FileBackend {
    type Watch = FileWatch;
    type Stop = FileStop;

    fn read(&self, location: &PreferenceLocation) -> Result<ThemePreference, PreferenceError> {
        let content = read_text(&location.path).map_err(|err| file_error(err, location))?;
        let ini = Ini::load_from_str(&content).map_err(|e| parse_error(location, e))?;

        let raw = ini
            .iter()
            .find_map(|(_, props)| props.get(&location.value_name))
            .ok_or_else(|| PreferenceError::not_found(location))?;
        let value = parse_truthy(raw).ok_or_else(|| {
            PreferenceError::platform(format!("{location}: not a boolean value: {raw:?}"))
        })?;

        Ok(location.sense.interpret(value))
    }

    fn stop_signal(&self) -> Result<FileStop, PreferenceError> {
        let (sender, receiver) = bounded(1);
        Ok(FileStop {
            raised: AtomicBool::new(false),
            sender,
            receiver,
        })
    }

    fn open_watch(&self, location: &PreferenceLocation) -> Result<FileWatch, PreferenceError> {
        let path = Path::new(&location.path);
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| PreferenceError::platform(format!("{location}: not a file path")))?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let (sender, events) = unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = sender.send(res);
        })?;
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|err| watch_error(err, location))?;

        tracing::debug!(target: TARGET, directory = %directory.display(), "watching key file directory");
        Ok(FileWatch {
            _watcher: watcher,
            events,
            file_name,
        })
    }

    fn wait(&self, watch: &mut FileWatch, stop: &FileStop) -> Result<WaitOutcome, PreferenceError> {
        loop {
            if stop.is_raised() {
                return Ok(WaitOutcome::Stopped);
            }

            select! {
                recv(stop.receiver) -> _ => return Ok(WaitOutcome::Stopped),
                recv(watch.events) -> msg => match msg {
                    Ok(Ok(event)) => {
                        if watch.is_relevant(&event) {
                            if stop.is_raised() {
                                return Ok(WaitOutcome::Stopped);
                            }
                            return Ok(WaitOutcome::Changed);
                        }
                    }
                    Ok(Err(err)) => return Err(err.into()),
                    Err(_) => {
                        return Err(PreferenceError::platform("file watcher disconnected"));
                    }
                },
            }
        }
    }

    fn rearm(&self, watch: &mut FileWatch) -> Result<(), PreferenceError> {
        // Events queued so far are covered by the read that follows.
        while watch.events.try_recv().is_ok() {}
        Ok(())
    }
}

/// An open watch on a key file's directory.
pub struct FileWatch {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    file_name: OsString,
}

impl FileWatch {
    fn is_relevant(&self, event: &Event) -> bool {
        // Our own reads produce open/close access events.
        match event.kind {
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {}
            EventKind::Access(_) => return false,
            _ => {}
        }
        event.paths.is_empty()
            || event
                .paths
                .iter()
                .any(|path| path.file_name() == Some(self.file_name.as_os_str()))
    }
}

/// Stop signal for [`FileBackend`] waits.
pub struct FileStop {
    raised: AtomicBool,
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl StopSignal for FileStop {
    fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        let _ = self.sender.try_send(());
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

fn file_error(err: FileError, location: &PreferenceLocation) -> PreferenceError {
    match err.kind() {
        FileErrorKind::NotFound => PreferenceError::not_found(location),
        FileErrorKind::PermissionDenied => PreferenceError::access_denied(location),
        _ => PreferenceError::platform(format!("{location}: {err}")),
    }
}

fn parse_error(location: &PreferenceLocation, err: ini::ParseError) -> PreferenceError {
    PreferenceError::platform(format!("{location}: {err}"))
}

fn watch_error(err: notify::Error, location: &PreferenceLocation) -> PreferenceError {
    match err.kind {
        notify::ErrorKind::PathNotFound => PreferenceError::not_found(location),
        notify::ErrorKind::Io(io) => PreferenceError::from_io(io, location),
        _ => PreferenceError::from(err),
    }
}
