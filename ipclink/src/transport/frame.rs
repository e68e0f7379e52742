//! Frame codec for stream transports.
//!
//! Frame format: `[length:4][checksum:4][payload:N]`
//!
//! - **length**: total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of the payload for integrity verification
//! - **payload**: one opaque message, at most [`MAX_MESSAGE_LENGTH`] bytes

use crate::message::MAX_MESSAGE_LENGTH;

/// Header size: 4 (length) + 4 (checksum) = 8 bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum total frame size (header plus a full-length payload).
pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_MESSAGE_LENGTH;

/// Frame codec error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from the header.
        expected: u32,
        /// Computed checksum from the payload.
        actual: u32,
    },

    /// Payload exceeds the maximum message length.
    #[error("frame payload too large: {size} bytes (max {MAX_MESSAGE_LENGTH})")]
    FrameTooLarge {
        /// Actual payload size in bytes.
        size: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },
}

/// Encode a payload into a frame.
///
/// # Errors
///
/// Returns `FrameTooLarge` if the payload exceeds [`MAX_MESSAGE_LENGTH`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_MESSAGE_LENGTH {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
        });
    }

    let total_length = FRAME_HEADER_SIZE + payload.len();
    let mut frame = Vec::with_capacity(total_length);
    frame.extend_from_slice(&(total_length as u32).to_le_bytes());
    frame.extend_from_slice(&crc32c::crc32c(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Try to decode one frame from a buffer that may hold partial data.
///
/// # Returns
///
/// - `Ok(Some((payload, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more data is needed (not an error condition)
/// - `Err` if the data is malformed; the link should be torn down
pub fn try_decode_frame(data: &[u8]) -> Result<Option<(Vec<u8>, usize)>, FrameError> {
    if data.len() < FRAME_HEADER_SIZE {
        return Ok(None); // Need more data for the header
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if (length as usize) < FRAME_HEADER_SIZE || (length as usize) > MAX_FRAME_SIZE {
        return Err(FrameError::InvalidLength { length });
    }

    let expected_len = length as usize;
    if data.len() < expected_len {
        return Ok(None); // Need more data for the payload
    }

    let expected = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let payload = &data[FRAME_HEADER_SIZE..expected_len];
    let actual = crc32c::crc32c(payload);
    if actual != expected {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    Ok(Some((payload.to_vec(), expected_len)))
}
