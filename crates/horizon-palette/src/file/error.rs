//! Error types for settings and key-file I/O.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error raised while reading or writing a settings or key file.
#[derive(Debug)]
pub struct FileError {
    kind: FileErrorKind,
    path: Option<PathBuf>,
    source: Option<io::Error>,
}

/// Classification of a [`FileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    /// File or directory not found.
    NotFound,
    /// Permission denied.
    PermissionDenied,
    /// Invalid path or filename.
    InvalidPath,
    /// The file exists but its contents could not be parsed or produced.
    InvalidData,
    /// Any other I/O failure.
    Other,
}

impl FileErrorKind {
    fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                Self::PermissionDenied
            }
            io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidFilename
            | io::ErrorKind::IsADirectory
            | io::ErrorKind::NotADirectory => Self::InvalidPath,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => Self::InvalidData,
            _ => Self::Other,
        }
    }
}

impl FileError {
    /// Creates a new file error.
    pub fn new(kind: FileErrorKind, path: Option<PathBuf>, source: Option<io::Error>) -> Self {
        Self { kind, path, source }
    }

    /// Creates a file error from an I/O error and the path it concerns.
    pub fn from_io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileErrorKind::from_io_kind(err.kind()),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// A "not found" error for `path`.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::new(FileErrorKind::NotFound, Some(path.into()), None)
    }

    /// An "invalid data" error for `path`, wrapping a parser or serializer error.
    pub fn invalid_data<E>(path: impl Into<PathBuf>, err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(
            FileErrorKind::InvalidData,
            Some(path.into()),
            Some(io::Error::new(io::ErrorKind::InvalidData, err)),
        )
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> FileErrorKind {
        self.kind
    }

    /// Returns the path involved in the error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Returns true if the file was not found.
    pub fn is_not_found(&self) -> bool {
        self.kind == FileErrorKind::NotFound
    }

    /// Returns true if permission was denied.
    pub fn is_permission_denied(&self) -> bool {
        self.kind == FileErrorKind::PermissionDenied
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, &self.source) {
            (Some(path), Some(source)) if self.kind == FileErrorKind::InvalidData => {
                write!(f, "{}: {}: {}", self.kind, path.display(), source)
            }
            (Some(path), _) => write!(f, "{}: {}", self.kind, path.display()),
            (None, _) => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileErrorKind::NotFound => write!(f, "file not found"),
            FileErrorKind::PermissionDenied => write!(f, "permission denied"),
            FileErrorKind::InvalidPath => write!(f, "invalid path"),
            FileErrorKind::InvalidData => write!(f, "invalid data"),
            FileErrorKind::Other => write!(f, "file error"),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<io::Error> for FileError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: FileErrorKind::from_io_kind(err.kind()),
            path: None,
            source: Some(err),
        }
    }
}

/// A specialized Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FileError::not_found("/path/to/settings.json");
        assert_eq!(err.to_string(), "file not found: /path/to/settings.json");
    }

    #[test]
    fn test_invalid_data_display_includes_cause() {
        let err = FileError::invalid_data("/tmp/settings.toml", "expected a table");
        assert_eq!(err.kind(), FileErrorKind::InvalidData);
        assert_eq!(
            err.to_string(),
            "invalid data: /tmp/settings.toml: expected a table"
        );
    }

    #[test]
    fn test_from_io_error_with_path() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "test");
        let file_err = FileError::from_io(io_err, "/restricted");
        assert!(file_err.is_permission_denied());
        assert!(!file_err.is_not_found());
        assert_eq!(
            file_err.path().map(|p| p.to_string_lossy().to_string()),
            Some("/restricted".to_string())
        );
    }

    #[test]
    fn test_from_io_error() {
        let file_err: FileError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(file_err.kind(), FileErrorKind::NotFound);
        assert!(file_err.path().is_none());
    }
}
