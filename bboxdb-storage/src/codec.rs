//! Binary layout of one tuple record.
//!
//! ```text
//! keyLength:i16 | bboxLength:i32 | payloadLength:i32 | versionTimestamp:i64 | receivedTimestamp:i64
//! keyBytes | bboxBytes | payloadBytes
//! ```
//!
//! All integers are big-endian.

use crate::errors::{StorageError, StorageResult};
use crate::hyperrectangle::Hyperrectangle;
use crate::tuple::Tuple;

/// Encoder and decoder for tuple records.
pub struct TupleCodec;

impl TupleCodec {
    /// Width of the fixed part of a record.
    pub const HEADER_LEN: usize = 2 + 4 + 4 + 8 + 8;

    /// Bytes between the key length and the key itself.
    const KEY_SKIP: usize = Self::HEADER_LEN - 2;

    /// Total size of the record `tuple` encodes to.
    pub fn encoded_len(tuple: &Tuple) -> usize {
        Self::HEADER_LEN
            + tuple.key().len()
            + tuple.bounding_box().encoded_len()
            + tuple.payload().len()
    }

    /// Appends the record of `tuple` to `out`.
    ///
    /// Fails with `InvalidArgument` for an empty key or for fields whose
    /// length does not fit the header widths.
    pub fn encode(tuple: &Tuple, out: &mut Vec<u8>) -> StorageResult<()> {
        let key = tuple.key().as_bytes();
        if key.is_empty() {
            return Err(StorageError::InvalidArgument("tuple key must not be empty".into()));
        }

        let key_len = i16::try_from(key.len()).map_err(|_| {
            StorageError::InvalidArgument(format!("key of {} bytes is too long", key.len()))
        })?;
        let bbox_len = Self::length_field(tuple.bounding_box().encoded_len(), "bounding box")?;
        let payload_len = Self::length_field(tuple.payload().len(), "payload")?;

        out.reserve(Self::encoded_len(tuple));
        out.extend_from_slice(&key_len.to_be_bytes());
        out.extend_from_slice(&bbox_len.to_be_bytes());
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(&tuple.version_timestamp().to_be_bytes());
        out.extend_from_slice(&tuple.received_timestamp().to_be_bytes());
        out.extend_from_slice(key);
        tuple.bounding_box().write_bytes(out);
        out.extend_from_slice(tuple.payload());
        Ok(())
    }

    /// Decodes the record starting at `*pos` and moves `*pos` past it.
    pub fn decode(buf: &[u8], pos: &mut usize) -> StorageResult<Tuple> {
        let header = Header::parse(buf, *pos)?;
        let mut cursor = *pos + Self::HEADER_LEN;

        let key = Self::decode_key(take(buf, &mut cursor, header.key_len)?)?;
        let bounding_box = Hyperrectangle::from_bytes(take(buf, &mut cursor, header.bbox_len)?)?;
        let payload = take(buf, &mut cursor, header.payload_len)?.to_vec();

        *pos = cursor;
        Ok(Tuple::new(
            key,
            bounding_box,
            payload,
            header.version_timestamp,
            header.received_timestamp,
        ))
    }

    /// Reads only the key of the record at `*pos`. `*pos` ends right after
    /// the key bytes; the box and payload are never touched.
    pub fn decode_key_only(buf: &[u8], pos: &mut usize) -> StorageResult<String> {
        let mut cursor = *pos;
        let raw_len = take(buf, &mut cursor, 2)?;
        let key_len = i16::from_be_bytes([raw_len[0], raw_len[1]]);
        let key_len = checked_len(i64::from(key_len), "key")?;

        cursor += Self::KEY_SKIP;
        let key = Self::decode_key(take(buf, &mut cursor, key_len)?)?;

        *pos = cursor;
        Ok(key)
    }

    /// Full record length announced by the header at the start of `header`.
    pub fn record_len(header: &[u8]) -> StorageResult<usize> {
        let header = Header::parse(header, 0)?;
        Ok(Self::HEADER_LEN + header.key_len + header.bbox_len + header.payload_len)
    }

    fn decode_key(bytes: &[u8]) -> StorageResult<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StorageError::Format(format!("key is not valid UTF-8: {}", e)))
    }

    fn length_field(len: usize, what: &str) -> StorageResult<i32> {
        i32::try_from(len).map_err(|_| {
            StorageError::InvalidArgument(format!("{} of {} bytes is too long", what, len))
        })
    }
}

struct Header {
    key_len: usize,
    bbox_len: usize,
    payload_len: usize,
    version_timestamp: i64,
    received_timestamp: i64,
}

impl Header {
    fn parse(buf: &[u8], pos: usize) -> StorageResult<Header> {
        let mut cursor = pos;
        let raw = take(buf, &mut cursor, TupleCodec::HEADER_LEN)?;

        let key_len = i16::from_be_bytes([raw[0], raw[1]]);
        let bbox_len = i32::from_be_bytes([raw[2], raw[3], raw[4], raw[5]]);
        let payload_len = i32::from_be_bytes([raw[6], raw[7], raw[8], raw[9]]);

        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&raw[10..18]);
        let version_timestamp = i64::from_be_bytes(timestamp);
        timestamp.copy_from_slice(&raw[18..26]);
        let received_timestamp = i64::from_be_bytes(timestamp);

        Ok(Header {
            key_len: checked_len(i64::from(key_len), "key")?,
            bbox_len: checked_len(i64::from(bbox_len), "bounding box")?,
            payload_len: checked_len(i64::from(payload_len), "payload")?,
            version_timestamp,
            received_timestamp,
        })
    }
}

fn checked_len(len: i64, what: &str) -> StorageResult<usize> {
    usize::try_from(len)
        .map_err(|_| StorageError::Format(format!("negative {} length {}", what, len)))
}

fn take<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> StorageResult<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| {
            StorageError::Format(format!(
                "truncated record: need {} bytes at {}, have {}",
                len,
                cursor,
                buf.len()
            ))
        })?;
    let slice = &buf[*cursor..end];
    *cursor = end;
    Ok(slice)
}
