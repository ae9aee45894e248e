use super::file_view::FileView;
use super::key_index::INDEX_ENTRY_BYTES;
use super::service_state::{ServiceState, ServiceStatus};
use crate::config::AccessMode;
use crate::errors::{StorageError, StorageResult};
use log::{debug, error};
use parking_lot::RwLock;
use std::borrow::Cow;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Describes one kind of segment file: its magic preamble, file suffix
/// and, for fixed-record files, the record width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileKind {
    pub name: &'static str,
    pub magic: &'static [u8],
    pub suffix: &'static str,
    pub record_len: Option<u64>,
}

impl FileKind {
    pub const TUPLE_LOG: FileKind = FileKind {
        name: "tuple log",
        magic: b"bboxdb-log",
        suffix: ".sst",
        record_len: None,
    };

    pub const KEY_INDEX: FileKind = FileKind {
        name: "key index",
        magic: b"bboxdb-idx",
        suffix: ".idx",
        record_len: Some(INDEX_ENTRY_BYTES),
    };

    pub const SPATIAL_INDEX: FileKind = FileKind {
        name: "spatial index",
        magic: b"bboxdb-rtr",
        suffix: ".sidx",
        record_len: None,
    };

    /// Offset of the first byte after the magic preamble.
    pub fn data_start(&self) -> u64 {
        self.magic.len() as u64
    }
}

/// Read-only access to one segment file.
///
/// The reader moves through `stopped -> starting -> running -> stopping ->
/// terminated`, or to `failed` when the file cannot be opened. Reads run
/// under a usage guard; [`SegmentFileReader::shutdown`] waits for every guard
/// to drop before the view is unmapped.
pub struct SegmentFileReader {
    kind: FileKind,
    path: PathBuf,
    access_mode: AccessMode,
    state: ServiceState,
    view: RwLock<Option<FileView>>,
}

impl SegmentFileReader {
    pub fn new(kind: FileKind, path: impl Into<PathBuf>, access_mode: AccessMode) -> Self {
        let path = path.into();
        SegmentFileReader {
            state: ServiceState::new(format!("{} {}", kind.name, path.display())),
            kind,
            path,
            access_mode,
            view: RwLock::new(None),
        }
    }

    /// Opens the file and validates its magic preamble.
    ///
    /// On failure the reader enters the `failed` state and the error is
    /// returned: `Format` for a wrong or missing preamble or a partial
    /// record, `FileIo` for any storage failure.
    pub fn init(&self) -> StorageResult<()> {
        if !self
            .state
            .transition(ServiceStatus::Stopped, ServiceStatus::Starting)
        {
            return Err(StorageError::InvalidOperation(format!(
                "{} {} cannot start while {}",
                self.kind.name,
                self.path.display(),
                self.state.status()
            )));
        }

        match self.open_view() {
            Ok(view) => {
                *self.view.write() = Some(view);
                self.state.set(ServiceStatus::Running);
                Ok(())
            }
            Err(e) => {
                error!("Unable to open {} {}: {}", self.kind.name, self.path.display(), e);
                self.state.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn open_view(&self) -> StorageResult<FileView> {
        let file = File::open(&self.path).map_err(|e| StorageError::file_io(&self.path, 0, e))?;
        let len = file
            .metadata()
            .map_err(|e| StorageError::file_io(&self.path, 0, e))?
            .len();

        let magic = self.kind.magic;
        if len < magic.len() as u64 {
            return Err(StorageError::format(
                &self.path,
                format!("{} bytes are too short for a {} file", len, self.kind.name),
            ));
        }

        let view = FileView::open(file, len, self.access_mode)
            .map_err(|e| StorageError::file_io(&self.path, 0, e))?;

        let matches = {
            let preamble = view
                .read_at(0, magic.len())
                .map_err(|e| StorageError::file_io(&self.path, 0, e))?;
            preamble.as_ref() == magic
        };

        if !matches {
            return Err(StorageError::format(
                &self.path,
                format!("magic preamble of a {} file expected", self.kind.name),
            ));
        }

        if let Some(record_len) = self.kind.record_len {
            let body = len - magic.len() as u64;
            if body % record_len != 0 {
                return Err(StorageError::format(
                    &self.path,
                    format!("body of {} bytes is not a multiple of {}", body, record_len),
                ));
            }
        }

        Ok(view)
    }

    /// Stops the reader, blocks until all users released it and unmaps the
    /// file. Does nothing unless the reader is running.
    pub fn shutdown(&self) {
        if !self
            .state
            .transition(ServiceStatus::Running, ServiceStatus::Stopping)
        {
            debug!(
                "Skip shutdown of {} {}, reader is {}",
                self.kind.name,
                self.path.display(),
                self.state.status()
            );
            return;
        }

        self.state.wait_until_unused();
        self.view.write().take();
        self.state.set(ServiceStatus::Terminated);
    }

    /// Shuts the reader down and removes the file. A missing file is fine.
    pub fn delete(&self) -> StorageResult<()> {
        self.shutdown();
        remove_file_if_exists(&self.path)
    }

    pub fn acquire(&self) -> bool {
        self.state.acquire()
    }

    pub fn release(&self) {
        self.state.release()
    }

    /// Runs `f` against the open view while holding a usage.
    ///
    /// Returns `Ok(None)` when the reader is not running or the view was
    /// already released by a concurrent shutdown.
    pub fn with_view<R>(
        &self,
        f: impl FnOnce(&FileView) -> StorageResult<R>,
    ) -> StorageResult<Option<R>> {
        let Some(_guard) = self.state.guard() else {
            self.note_closed_read();
            return Ok(None);
        };

        let view = self.view.read();
        match view.as_ref() {
            Some(view) => f(view).map(Some),
            None => {
                self.note_closed_read();
                Ok(None)
            }
        }
    }

    /// Reads `len` bytes at `offset` from `view`.
    ///
    /// Ranges past the end of the file are `Format` errors, storage
    /// failures are wrapped with this file and the offset.
    pub fn read<'v>(&self, view: &'v FileView, offset: u64, len: usize) -> StorageResult<Cow<'v, [u8]>> {
        let in_bounds = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= view.len());
        if !in_bounds {
            return Err(StorageError::format(
                &self.path,
                format!(
                    "truncated record: {} bytes at offset {} exceed file length {}",
                    len,
                    offset,
                    view.len()
                ),
            ));
        }

        view.read_at(offset, len)
            .map_err(|e| StorageError::file_io(&self.path, offset, e))
    }

    fn note_closed_read(&self) {
        let status = self.state.status();
        if !matches!(status, ServiceStatus::Stopping | ServiceStatus::Terminated) {
            debug!(
                "Read on {} {} skipped, reader is {}",
                self.kind.name,
                self.path.display(),
                status
            );
        }
    }

    /// Length of the open file including the preamble.
    pub fn file_len(&self) -> Option<u64> {
        self.view.read().as_ref().map(FileView::len)
    }

    /// Bytes after the preamble, `0` when closed.
    pub fn data_len(&self) -> u64 {
        self.file_len()
            .map(|len| len.saturating_sub(self.kind.data_start()))
            .unwrap_or(0)
    }

    pub fn size_on_disk(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn status(&self) -> ServiceStatus {
        self.state.status()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_running()
    }

    pub fn failure(&self) -> Option<String> {
        self.state.failure()
    }

    pub fn usage(&self) -> usize {
        self.state.usage()
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::file_io(path, 0, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_file(path: &Path, bytes: &[u8]) {
        File::create(path).unwrap().write_all(bytes).unwrap();
    }

    fn log_bytes(body: &[u8]) -> Vec<u8> {
        let mut bytes = FileKind::TUPLE_LOG.magic.to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_init_and_read() {
        for mode in [AccessMode::Mapped, AccessMode::Buffered] {
            let dir = tempdir().unwrap();
            let path = dir.path().join("sstable_1.sst");
            write_file(&path, &log_bytes(b"hello"));

            let reader = SegmentFileReader::new(FileKind::TUPLE_LOG, &path, mode);
            assert_eq!(reader.status(), ServiceStatus::Stopped);
            reader.init().unwrap();
            assert!(reader.is_ready());
            assert_eq!(reader.data_len(), 5);

            let start = FileKind::TUPLE_LOG.data_start();
            let bytes = reader
                .with_view(|view| Ok(reader.read(view, start, 5)?.into_owned()))
                .unwrap()
                .unwrap();
            assert_eq!(bytes, b"hello");
            assert_eq!(reader.usage(), 0);
        }
    }

    #[test]
    fn test_magic_mismatch_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.idx");
        write_file(&path, &log_bytes(b"data"));

        let reader = SegmentFileReader::new(FileKind::KEY_INDEX, &path, AccessMode::Mapped);
        let err = reader.init().unwrap_err();
        assert!(err.is_format());
        assert_eq!(reader.status(), ServiceStatus::Failed);
        assert!(reader.failure().is_some());
    }

    #[test]
    fn test_partial_record_fails_reader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.idx");
        let mut bytes = FileKind::KEY_INDEX.magic.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 10, 0, 0]);
        write_file(&path, &bytes);

        let reader = SegmentFileReader::new(FileKind::KEY_INDEX, &path, AccessMode::Buffered);
        assert!(reader.init().unwrap_err().is_format());
        assert_eq!(reader.status(), ServiceStatus::Failed);
        assert!(reader.with_view(|view| Ok(view.len())).unwrap().is_none());
    }

    #[test]
    fn test_short_and_missing_files() {
        let dir = tempdir().unwrap();
        let short = dir.path().join("short.sst");
        write_file(&short, b"bbox");
        let reader = SegmentFileReader::new(FileKind::TUPLE_LOG, &short, AccessMode::Mapped);
        assert!(reader.init().unwrap_err().is_format());

        let missing = SegmentFileReader::new(
            FileKind::TUPLE_LOG,
            dir.path().join("missing.sst"),
            AccessMode::Mapped,
        );
        assert!(missing.init().unwrap_err().is_io());
        assert_eq!(missing.status(), ServiceStatus::Failed);
    }

    #[test]
    fn test_double_init_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.sst");
        write_file(&path, &log_bytes(b""));

        let reader = SegmentFileReader::new(FileKind::TUPLE_LOG, &path, AccessMode::Mapped);
        reader.init().unwrap();
        assert!(matches!(reader.init(), Err(StorageError::InvalidOperation(_))));
    }

    #[test]
    fn test_read_past_end_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.sst");
        write_file(&path, &log_bytes(b"abc"));

        let reader = SegmentFileReader::new(FileKind::TUPLE_LOG, &path, AccessMode::Mapped);
        reader.init().unwrap();
        let err = reader
            .with_view(|view| Ok(reader.read(view, 11, 4)?.len()))
            .unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_read_after_shutdown_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.sst");
        write_file(&path, &log_bytes(b"abc"));

        let reader = SegmentFileReader::new(FileKind::TUPLE_LOG, &path, AccessMode::Mapped);
        reader.init().unwrap();
        reader.shutdown();
        assert_eq!(reader.status(), ServiceStatus::Terminated);
        assert!(reader.with_view(|view| Ok(view.len())).unwrap().is_none());
        assert_eq!(reader.file_len(), None);
        assert!(path.exists());
    }

    #[test]
    fn test_shutdown_waits_for_users() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.sst");
        write_file(&path, &log_bytes(b"abc"));

        let reader = Arc::new(SegmentFileReader::new(
            FileKind::TUPLE_LOG,
            &path,
            AccessMode::Mapped,
        ));
        reader.init().unwrap();
        assert!(reader.acquire());

        let done = Arc::new(AtomicBool::new(false));
        let handle = {
            let reader = reader.clone();
            let done = done.clone();
            thread::spawn(move || {
                reader.shutdown();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));
        assert_eq!(reader.status(), ServiceStatus::Stopping);
        assert!(!reader.acquire());

        reader.release();
        handle.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(reader.status(), ServiceStatus::Terminated);
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.sst");
        write_file(&path, &log_bytes(b"abc"));

        let reader = SegmentFileReader::new(FileKind::TUPLE_LOG, &path, AccessMode::Mapped);
        reader.init().unwrap();
        reader.delete().unwrap();
        assert!(!path.exists());
        reader.delete().unwrap();
    }
}
