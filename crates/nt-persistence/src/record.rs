//! Framing for a single snapshot file on disk.
//!
//! A snapshot is one whole-file record, not an append-only log: a format
//! version, a length-prefixed payload, and a trailing checksum, bracketed by
//! sentinel markers so a reader can tell a torn write (process killed
//! mid-`fsync`) from a genuinely corrupted file.
//!
//! # Frame format
//!
//! ```text
//! [RECORD_START:u32][format_version:u32][length:u64][payload:bytes][checksum:32B][RECORD_END:u32]
//!       4B                  4B               8B          variable         32B           4B
//! ```
//!
//! If `RECORD_END` is missing, the writer was interrupted before the frame
//! was fully flushed; the loader falls back to the previous generation.

use bytes::{Bytes, BytesMut};

use crate::PersistenceError;

/// Magic number marking the start of a snapshot frame (0xBADC0FFE in little-endian).
const RECORD_START: u32 = 0xBADC_0FFE;

/// Magic number marking the end of a complete snapshot frame (0xC0FFEE42 in little-endian).
const RECORD_END: u32 = 0xC0FF_EE42;

/// start_sentinel(4) + format_version(4) + length(8) = 16 bytes.
const HEADER_SIZE: usize = 16;

/// header(16) + checksum(32) + end_sentinel(4) = 52 bytes.
const RECORD_OVERHEAD: usize = 52;


/// One framed snapshot: a format version and an opaque, already-encoded
/// payload (produced by [`crate::codec`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    format_version: u32,
    payload: Bytes,
}

impl Frame {
    pub fn new(format_version: u32, payload: Bytes) -> Self {
        Self {
            format_version,
            payload,
        }
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Serializes the frame to bytes: sentinel, header, payload, checksum,
    /// sentinel. All integers are little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_OVERHEAD + self.payload.len());
        buf.extend_from_slice(&RECORD_START.to_le_bytes());
        buf.extend_from_slice(&self.format_version.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        buf.extend_from_slice(&self.payload);

        let checksum = blake3::hash(&buf);
        buf.extend_from_slice(checksum.as_bytes());

        buf.extend_from_slice(&RECORD_END.to_le_bytes());
        buf
    }

    pub fn to_bytes_into(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.to_bytes());
    }

    /// Deserializes a frame from bytes.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::UnexpectedEof`] if the data is truncated
    /// - [`PersistenceError::TornWrite`] if either sentinel is missing
    /// - [`PersistenceError::ChecksumMismatch`] if the checksum doesn't match
    pub fn from_bytes(data: &Bytes) -> Result<Self, PersistenceError> {
        if data.len() < HEADER_SIZE {
            return Err(PersistenceError::UnexpectedEof);
        }

        let start_sentinel = u32::from_le_bytes(data[0..4].try_into().expect("checked above"));
        if start_sentinel != RECORD_START {
            return Err(PersistenceError::TornWrite {
                reason: "missing or corrupted RECORD_START sentinel".to_string(),
            });
        }

        let format_version = u32::from_le_bytes(data[4..8].try_into().expect("checked above"));
        let length = u64::from_le_bytes(data[8..16].try_into().expect("checked above")) as usize;

        let total_size = HEADER_SIZE + length + 32 + 4;
        if data.len() < total_size {
            return Err(PersistenceError::UnexpectedEof);
        }

        let payload = data.slice(HEADER_SIZE..HEADER_SIZE + length);

        let checksum_offset = HEADER_SIZE + length;
        let stored_checksum: [u8; 32] = data[checksum_offset..checksum_offset + 32]
            .try_into()
            .expect("checked above");
        let computed_checksum = blake3::hash(&data[0..checksum_offset]);
        if stored_checksum != *computed_checksum.as_bytes() {
            return Err(PersistenceError::ChecksumMismatch);
        }

        let end_sentinel_offset = checksum_offset + 32;
        let end_sentinel = u32::from_le_bytes(
            data[end_sentinel_offset..end_sentinel_offset + 4]
                .try_into()
                .expect("checked above"),
        );
        if end_sentinel != RECORD_END {
            return Err(PersistenceError::TornWrite {
                reason: "missing or corrupted RECORD_END sentinel".to_string(),
            });
        }

        Ok(Self {
            format_version,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_bytes() {
        let frame = Frame::new(1, Bytes::from_static(b"hello snapshot"));
        let bytes = Bytes::from(frame.to_bytes());
        let parsed = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = Frame::new(1, Bytes::from_static(b"hello snapshot"));
        let mut bytes = frame.to_bytes();
        bytes.truncate(bytes.len() - 1);
        let result = Frame::from_bytes(&Bytes::from(bytes));
        assert!(matches!(result, Err(PersistenceError::TornWrite { .. } | PersistenceError::UnexpectedEof)));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let frame = Frame::new(1, Bytes::from_static(b"hello snapshot"));
        let mut bytes = frame.to_bytes();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let result = Frame::from_bytes(&Bytes::from(bytes));
        assert!(matches!(
            result,
            Err(PersistenceError::ChecksumMismatch | PersistenceError::TornWrite { .. })
        ));
    }
}
