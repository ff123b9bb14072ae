//! Registry preference locations (Windows).
//!
//! Locations are subkeys of `HKEY_CURRENT_USER`. A watch is the opened key
//! plus an auto-reset event registered through `RegNotifyChangeKeyValue`.
//! That registration is single-shot, so it is renewed after every firing.
//! Waits compose the notify event with a manual-reset stop event via
//! `WaitForMultipleObjects`, with the stop event first so it wins ties.

use std::ffi::c_void;

use horizon_palette_core::logging::targets;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND, ERROR_SUCCESS,
    FALSE, HANDLE, TRUE, WAIT_OBJECT_0, WIN32_ERROR,
};
use windows::Win32::System::Registry::{
    HKEY, HKEY_CURRENT_USER, KEY_NOTIFY, KEY_QUERY_VALUE, REG_NOTIFY_CHANGE_ATTRIBUTES,
    REG_NOTIFY_CHANGE_LAST_SET, RRF_RT_REG_DWORD, RegCloseKey, RegGetValueW,
    RegNotifyChangeKeyValue, RegOpenKeyExW,
};
use windows::Win32::System::Threading::{CreateEventW, INFINITE, SetEvent, WaitForMultipleObjects};
use windows::core::PCWSTR;

use super::{
    PreferenceBackend, PreferenceError, PreferenceLocation, StopSignal, ThemePreference,
    WaitOutcome,
};

const TARGET: &str = targets::WATCHER;

/// Preference backend for `HKEY_CURRENT_USER` registry values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryBackend;

impl RegistryBackend {
    /// Create a registry backend.
    pub fn new() -> Self {
        Self
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn status_error(code: WIN32_ERROR, location: &PreferenceLocation, operation: &str) -> PreferenceError {
    match code {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => PreferenceError::not_found(location),
        ERROR_ACCESS_DENIED => PreferenceError::access_denied(location),
        _ => PreferenceError::platform(format!(
            "{operation} failed for {location}: {}",
            windows::core::Error::from(code.to_hresult())
        )),
    }
}

/// Register (or renew) the change notification for `watch`.
fn register_notification(watch: &RegistryWatch) -> Result<(), PreferenceError> {
    // SAFETY: `watch.key` and `watch.event` are open handles owned by the
    // watch and stay valid until it is dropped.
    let status = unsafe {
        RegNotifyChangeKeyValue(
            watch.key,
            TRUE,
            REG_NOTIFY_CHANGE_LAST_SET | REG_NOTIFY_CHANGE_ATTRIBUTES,
            watch.event,
            TRUE,
        )
    };
    if status == ERROR_SUCCESS {
        Ok(())
    } else {
        Err(status_error(status, &watch.location, "RegNotifyChangeKeyValue"))
    }
}

impl PreferenceBackend for RegistryBackend {
    type Watch = RegistryWatch;
    type Stop = RegistryStop;

    fn read(&self, location: &PreferenceLocation) -> Result<ThemePreference, PreferenceError> {
        let subkey = wide(&location.path);
        let value_name = wide(&location.value_name);
        let mut data: u32 = 0;
        let mut size = std::mem::size_of::<u32>() as u32;

        // SAFETY: both strings are NUL-terminated and outlive the call; `data`
        // and `size` describe a writable DWORD. RegGetValueW opens and closes
        // the key itself.
        let status = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                PCWSTR(subkey.as_ptr()),
                PCWSTR(value_name.as_ptr()),
                RRF_RT_REG_DWORD,
                None,
                Some(&mut data as *mut u32 as *mut c_void),
                Some(&mut size as *mut u32),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(status_error(status, location, "RegGetValueW"));
        }

        Ok(location.sense.interpret(data != 0))
    }

    fn stop_signal(&self) -> Result<RegistryStop, PreferenceError> {
        // SAFETY: no security attributes and no name; the handle is owned by
        // the returned RegistryStop.
        let event = unsafe { CreateEventW(None, TRUE, FALSE, PCWSTR::null()) }
            .map_err(|e| PreferenceError::platform(format!("CreateEventW failed: {e}")))?;
        Ok(RegistryStop { event })
    }

    fn open_watch(&self, location: &PreferenceLocation) -> Result<RegistryWatch, PreferenceError> {
        let subkey = wide(&location.path);
        let mut key = HKEY::default();

        // SAFETY: `subkey` is NUL-terminated and `key` is a valid out pointer.
        let status = unsafe {
            RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR(subkey.as_ptr()),
                0,
                KEY_NOTIFY | KEY_QUERY_VALUE,
                &mut key,
            )
        };
        if status != ERROR_SUCCESS {
            return Err(status_error(status, location, "RegOpenKeyExW"));
        }

        // SAFETY: as in `stop_signal`. Auto-reset, so a wait consumes it.
        let event = match unsafe { CreateEventW(None, FALSE, FALSE, PCWSTR::null()) } {
            Ok(event) => event,
            Err(e) => {
                // SAFETY: `key` was opened above and is not used afterwards.
                let _ = unsafe { RegCloseKey(key) };
                return Err(PreferenceError::platform(format!("CreateEventW failed: {e}")));
            }
        };

        // From here on Drop releases both handles.
        let watch = RegistryWatch {
            key,
            event,
            location: location.clone(),
        };
        register_notification(&watch)?;

        tracing::debug!(target: TARGET, %location, "registry watch armed");
        Ok(watch)
    }

    fn wait(
        &self,
        watch: &mut RegistryWatch,
        stop: &RegistryStop,
    ) -> Result<WaitOutcome, PreferenceError> {
        let handles = [stop.event, watch.event];

        // SAFETY: both handles are open events owned by `stop` and `watch`,
        // which outlive the wait.
        let result = unsafe { WaitForMultipleObjects(&handles, FALSE, INFINITE) };

        match result.0.wrapping_sub(WAIT_OBJECT_0.0) {
            0 => Ok(WaitOutcome::Stopped),
            1 => Ok(WaitOutcome::Changed),
            _ => Err(PreferenceError::platform(format!(
                "WaitForMultipleObjects failed for {}: {}",
                watch.location,
                windows::core::Error::from_win32()
            ))),
        }
    }

    fn rearm(&self, watch: &mut RegistryWatch) -> Result<(), PreferenceError> {
        register_notification(watch)
    }
}

/// An open registry key with a pending change notification.
pub struct RegistryWatch {
    key: HKEY,
    event: HANDLE,
    location: PreferenceLocation,
}

// SAFETY: the key and event handles are plain kernel handles usable from any
// thread; the watch is only ever used by one thread at a time.
unsafe impl Send for RegistryWatch {}

impl Drop for RegistryWatch {
    fn drop(&mut self) {
        // SAFETY: both handles were opened by `open_watch` and are released
        // exactly once, here. Closing the key cancels the pending notification.
        unsafe {
            let _ = RegCloseKey(self.key);
            let _ = CloseHandle(self.event);
        }
        tracing::debug!(target: TARGET, location = %self.location, "registry watch released");
    }
}

/// Manual-reset event used to interrupt registry waits.
pub struct RegistryStop {
    event: HANDLE,
}

// SAFETY: event handles may be signalled and waited on from any thread.
unsafe impl Send for RegistryStop {}
unsafe impl Sync for RegistryStop {}

impl StopSignal for RegistryStop {
    fn raise(&self) {
        // SAFETY: the event is open for the lifetime of `self`.
        if let Err(e) = unsafe { SetEvent(self.event) } {
            tracing::error!(target: TARGET, error = %e, "failed to raise stop event");
        }
    }

    fn is_raised(&self) -> bool {
        use windows::Win32::System::Threading::WaitForSingleObject;

        // SAFETY: zero-timeout poll of an open manual-reset event.
        unsafe { WaitForSingleObject(self.event, 0) == WAIT_OBJECT_0 }
    }
}

impl Drop for RegistryStop {
    fn drop(&mut self) {
        // SAFETY: the event was created in `stop_signal` and is closed once.
        unsafe {
            let _ = CloseHandle(self.event);
        }
    }
}
