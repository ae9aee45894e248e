//! Error and result types shared by every reader in this crate.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing segment files.
///
/// An absent key or an empty region is never an error. A read that races
/// with a reader shutdown is not an error either: such reads return `None`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Magic mismatch, truncated or malformed record.
    #[error("Format error: {0}")]
    Format(String),

    #[error("IO error on {} at offset {offset}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl StorageError {
    /// Wraps an I/O failure with the file and byte offset it happened at.
    pub fn file_io(path: &Path, offset: u64, source: io::Error) -> Self {
        StorageError::FileIo {
            path: path.to_path_buf(),
            offset,
            source,
        }
    }

    pub fn format(path: &Path, message: impl AsRef<str>) -> Self {
        StorageError::Format(format!("{}: {}", path.display(), message.as_ref()))
    }

    /// Returns true for magic mismatches and corrupt records.
    pub fn is_format(&self) -> bool {
        matches!(self, StorageError::Format(_))
    }

    /// Returns true for storage failures, with or without file context.
    pub fn is_io(&self) -> bool {
        matches!(self, StorageError::FileIo { .. } | StorageError::Io(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_io_display_names_path_and_offset() {
        let err = StorageError::file_io(
            Path::new("/data/sstable_1.sst"),
            42,
            io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
        );
        let message = err.to_string();
        assert!(message.contains("sstable_1.sst"));
        assert!(message.contains("42"));
        assert!(err.is_io());
        assert!(!err.is_format());
    }

    #[test]
    fn test_format_helper() {
        let err = StorageError::format(Path::new("a.idx"), "bad magic");
        assert!(err.is_format());
        assert_eq!(err.to_string(), "Format error: a.idx: bad magic");
    }

    #[test]
    fn test_io_from_conversion() {
        let err: StorageError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(err.is_io());
    }
}
