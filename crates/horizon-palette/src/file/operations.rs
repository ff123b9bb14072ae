//! Whole-file reads and atomic replacement.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{FileError, FileErrorKind, FileResult};

/// Distinguishes temp files of concurrent writers within one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Reads the entire contents of a file as a string.
///
/// # Errors
///
/// Returns an error if the file does not exist, cannot be read, or is not
/// valid UTF-8.
pub fn read_text(path: impl AsRef<Path>) -> FileResult<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| FileError::from_io(e, path))
}

/// Replaces the file at `path` with whatever `f` writes.
///
/// ```ignore
/// use std::io::Write;
///
/// atomic_write("settings.json", |w| {
///     w.write_all(b"{}").map_err(|e| FileError::from_io(e, "settings.json"))
/// })?;
/// ```
///
/// Data goes to a temporary file in the same directory, which is flushed,
/// synced and renamed over the target. Readers and file watchers therefore
/// only ever see the old or the new contents. If `f` or any step fails the
/// original file is left untouched.
pub fn atomic_write<F>(path: impl AsRef<Path>, f: F) -> FileResult<()>
where
    F: FnOnce(&mut AtomicWriter) -> FileResult<()>,
{
    let mut writer = AtomicWriter::new(path)?;
    f(&mut writer)?;
    writer.commit()
}

/// A writer whose output replaces the target file only on [`commit`].
///
/// Dropping the writer without committing removes the temporary file.
///
/// [`commit`]: AtomicWriter::commit
pub struct AtomicWriter {
    target_path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<fs::File>>,
    committed: bool,
}

impl AtomicWriter {
    /// Creates the temporary file next to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn new(path: impl AsRef<Path>) -> FileResult<Self> {
        let target_path = path.as_ref().to_path_buf();

        // Same directory, so the final rename never crosses filesystems.
        let parent = match target_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = target_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                FileError::new(FileErrorKind::InvalidPath, Some(target_path.clone()), None)
            })?;

        let temp_name = format!(
            ".{}.tmp.{}.{}",
            file_name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let temp_path = parent.join(temp_name);

        let file = fs::File::create(&temp_path).map_err(|e| FileError::from_io(e, &target_path))?;

        Ok(Self {
            target_path,
            temp_path,
            writer: Some(BufWriter::new(file)),
            committed: false,
        })
    }

    /// Returns the target path.
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Writes all bytes to the temporary file.
    pub fn write_bytes(&mut self, buf: &[u8]) -> FileResult<()> {
        Write::write_all(self, buf).map_err(|e| FileError::from_io(e, &self.target_path))
    }

    /// Flushes, syncs and renames the temporary file over the target.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The temporary file is removed and
    /// the original file, if any, is left unchanged.
    pub fn commit(mut self) -> FileResult<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| FileError::from_io(consumed(), &self.target_path))?;

        writer
            .flush()
            .map_err(|e| FileError::from_io(e, &self.target_path))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| FileError::from_io(e, &self.target_path))?;

        // Close the handle before renaming; Windows refuses otherwise.
        drop(writer);

        fs::rename(&self.temp_path, &self.target_path)
            .map_err(|e| FileError::from_io(e, &self.target_path))?;

        self.committed = true;
        Ok(())
    }
}

fn consumed() -> io::Error {
    io::Error::other("atomic writer already committed")
}

impl Write for AtomicWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.as_mut().ok_or_else(consumed)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.as_mut().ok_or_else(consumed)?.flush()
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.writer.take());
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

impl std::fmt::Debug for AtomicWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicWriter")
            .field("target_path", &self.target_path)
            .field("temp_path", &self.temp_path)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}
