use crate::config::AccessMode;
use memmap2::Mmap;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Read-only view of one open file.
///
/// Dropping the view unmaps the memory and closes the handle.
pub enum FileView {
    Mapped { map: Mmap, _file: File },
    Buffered { file: Mutex<File>, len: u64 },
}

impl FileView {
    pub fn open(file: File, len: u64, mode: AccessMode) -> io::Result<FileView> {
        match mode {
            AccessMode::Mapped => {
                // Segment files are never modified after creation.
                let map = unsafe { Mmap::map(&file)? };
                Ok(FileView::Mapped { map, _file: file })
            }
            AccessMode::Buffered => Ok(FileView::Buffered {
                file: Mutex::new(file),
                len,
            }),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            FileView::Mapped { map, .. } => map.len() as u64,
            FileView::Buffered { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows from the mapping, copies through the handle otherwise.
    /// The caller checks the range against [`FileView::len`].
    pub fn read_at(&self, offset: u64, len: usize) -> io::Result<Cow<'_, [u8]>> {
        match self {
            FileView::Mapped { map, .. } => {
                let start = usize::try_from(offset)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
                start
                    .checked_add(len)
                    .and_then(|end| map.get(start..end))
                    .map(Cow::Borrowed)
                    .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
            }
            FileView::Buffered { file, .. } => {
                let mut buffer = vec![0u8; len];
                let mut file = file.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buffer)?;
                Ok(Cow::Owned(buffer))
            }
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, FileView::Mapped { .. })
    }
}
