use crate::errors::{StorageError, StorageResult};
use crate::hyperrectangle::Hyperrectangle;
use std::io::Read;

/// Leaf fact of the R-tree: a tuple box and the log offset of the tuple.
#[derive(Clone, PartialEq, Debug)]
pub struct SpatialIndexEntry {
    bounding_box: Hyperrectangle,
    offset: u64,
}

impl SpatialIndexEntry {
    pub fn new(bounding_box: Hyperrectangle, offset: u64) -> Self {
        SpatialIndexEntry {
            bounding_box,
            offset,
        }
    }

    pub fn bounding_box(&self) -> &Hyperrectangle {
        &self.bounding_box
    }

    /// Byte offset of the tuple in the segment log.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Appends `offset:i32, bboxLen:i32, bboxBytes`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> StorageResult<()> {
        let offset = i32::try_from(self.offset).map_err(|_| {
            StorageError::InvalidArgument(format!("log offset {} exceeds the index format", self.offset))
        })?;
        let bbox_len = i32::try_from(self.bounding_box.encoded_len())
            .map_err(|_| StorageError::InvalidArgument("bounding box too large".into()))?;

        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&bbox_len.to_be_bytes());
        self.bounding_box.write_bytes(out);
        Ok(())
    }

    pub fn read_from<R: Read>(input: &mut R) -> StorageResult<Self> {
        let offset = read_i32(input)?;
        let offset = u64::try_from(offset)
            .map_err(|_| StorageError::Format(format!("negative log offset {} in spatial entry", offset)))?;
        let bounding_box = read_box(input)?;
        Ok(SpatialIndexEntry::new(bounding_box, offset))
    }
}

pub(crate) fn read_i32<R: Read>(input: &mut R) -> StorageResult<i32> {
    let mut raw = [0u8; 4];
    read_exact(input, &mut raw)?;
    Ok(i32::from_be_bytes(raw))
}

/// Reads `bboxLen:i32, bboxBytes`.
pub(crate) fn read_box<R: Read>(input: &mut R) -> StorageResult<Hyperrectangle> {
    let len = read_i32(input)?;
    let len = u64::try_from(len)
        .map_err(|_| StorageError::Format(format!("negative bounding box length {}", len)))?;

    let mut bytes = Vec::new();
    input.by_ref().take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(StorageError::Format("truncated bounding box in spatial index".into()));
    }
    Hyperrectangle::from_bytes(&bytes)
}

/// `read_exact` reporting a short read as a format error.
pub(crate) fn read_exact<R: Read>(input: &mut R, buf: &mut [u8]) -> StorageResult<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => StorageError::Format("truncated spatial index".into()),
        _ => StorageError::Io(e),
    })
}
