//! Binary codec for request and response frames.
//!
//! Wire format:
//! ```text
//! Request:   [cmd:2][payload:4 | 14][0x0A]
//! Response:  [cmd:2][status:1][payload:N][0x0A]
//! ```
//!
//! Requests have a fixed length per [`FrameVariant`], so the reader never has
//! to scan for the terminator.  Response payloads may themselves contain
//! `0x0A`, which is why the console side asks [`response_payload_len`] how
//! many bytes to expect instead of reading up to the first newline.

use thiserror::Error;

use crate::protocol::command::{ControlCommand, DataCommand, ALL_UPDATE_CODE};
use crate::protocol::frame::{
    FrameVariant, RequestFrame, ResponseFrame, StatusCode, COMMAND_LEN, FRAME_TERMINATOR,
    RESPONSE_OVERHEAD,
};

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    /// Fewer bytes than one complete frame.
    #[error("incomplete frame: expected {expected} bytes, got {actual}")]
    Incomplete { expected: usize, actual: usize },

    /// More bytes than one frame of this variant.
    #[error("oversized frame: expected {expected} bytes, got {actual}")]
    Oversized { expected: usize, actual: usize },

    /// The last byte of the frame is not `0x0A`.
    #[error("bad terminator: 0x{0:02X}")]
    BadTerminator(u8),

    /// The command identifier contains a non-ASCII byte.
    #[error("non-ASCII command identifier")]
    NonAsciiCommand,

    /// A response payload is larger than the variant allows.
    #[error("payload too large: {len} bytes, limit {limit}")]
    PayloadTooLarge { len: usize, limit: usize },

    /// A payload field read past the end of the payload.
    #[error("payload too short: need {needed} bytes at offset {offset}, have {available}")]
    PayloadTooShort {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A response carried a status byte outside the known set.
    #[error("unknown status byte: 0x{0:02X}")]
    UnknownStatus(u8),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one request frame of the given variant.
///
/// `bytes` must be exactly one frame long.
///
/// # Errors
///
/// Returns [`FrameError`] if the length, terminator, or command bytes are
/// invalid.  A [`FrameError`] is a framing fault: the caller drops the frame
/// without answering.
///
/// # Examples
///
/// ```rust
/// use wms_core::protocol::{decode_request, FrameVariant};
///
/// let frame = decode_request(FrameVariant::Control, b"RE\x00\x00\x00\x05\n").unwrap();
/// assert_eq!(frame.command, "RE");
/// assert_eq!(frame.payload, vec![0, 0, 0, 5]);
/// ```
pub fn decode_request(variant: FrameVariant, bytes: &[u8]) -> Result<RequestFrame, FrameError> {
    let expected = variant.request_len();
    if bytes.len() < expected {
        return Err(FrameError::Incomplete {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(FrameError::Oversized {
            expected,
            actual: bytes.len(),
        });
    }

    let terminator = bytes[expected - 1];
    if terminator != FRAME_TERMINATOR {
        return Err(FrameError::BadTerminator(terminator));
    }

    let command = decode_command(&bytes[..COMMAND_LEN])?;
    let payload = bytes[COMMAND_LEN..expected - 1].to_vec();

    Ok(RequestFrame { command, payload })
}

/// Encodes a request frame, right-padding or truncating `payload` to the
/// variant's fixed width.
///
/// Commands shorter than two bytes are zero-filled.
pub fn encode_request(variant: FrameVariant, command: &str, payload: &[u8]) -> Vec<u8> {
    let width = variant.payload_len();
    let mut buf = Vec::with_capacity(variant.request_len());

    push_command(&mut buf, command);
    let take = payload.len().min(width);
    buf.extend_from_slice(&payload[..take]);
    buf.resize(COMMAND_LEN + width, 0x00);
    buf.push(FRAME_TERMINATOR);
    buf
}

/// Encodes a response frame.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] if `payload` exceeds the variant's
/// maximum response payload.
pub fn encode_response(
    variant: FrameVariant,
    command: &str,
    status: StatusCode,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let limit = variant.max_response_payload();
    if payload.len() > limit {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            limit,
        });
    }

    let mut buf = Vec::with_capacity(RESPONSE_OVERHEAD + payload.len());
    push_command(&mut buf, command);
    buf.push(status as u8);
    buf.extend_from_slice(payload);
    buf.push(FRAME_TERMINATOR);
    Ok(buf)
}

/// Decodes one complete response frame.
///
/// The payload is everything between the status byte and the final
/// terminator, so `bytes` must already be cut to exactly one frame.
pub fn decode_response(variant: FrameVariant, bytes: &[u8]) -> Result<ResponseFrame, FrameError> {
    if bytes.len() < RESPONSE_OVERHEAD {
        return Err(FrameError::Incomplete {
            expected: RESPONSE_OVERHEAD,
            actual: bytes.len(),
        });
    }
    let max = RESPONSE_OVERHEAD + variant.max_response_payload();
    if bytes.len() > max {
        return Err(FrameError::Oversized {
            expected: max,
            actual: bytes.len(),
        });
    }

    let last = bytes[bytes.len() - 1];
    if last != FRAME_TERMINATOR {
        return Err(FrameError::BadTerminator(last));
    }

    let command = decode_command(&bytes[..COMMAND_LEN])?;
    let status_byte = bytes[COMMAND_LEN];
    let status =
        StatusCode::try_from(status_byte).map_err(|_| FrameError::UnknownStatus(status_byte))?;
    let payload = bytes[COMMAND_LEN + 1..bytes.len() - 1].to_vec();

    Ok(ResponseFrame {
        command,
        status,
        payload,
    })
}

/// Number of payload bytes a response with this command and status carries.
///
/// Error responses never carry a payload.  Unknown commands report 0.
pub fn response_payload_len(variant: FrameVariant, command: &str, status: StatusCode) -> usize {
    if !status.is_success() {
        return 0;
    }
    match variant {
        FrameVariant::Control => ControlCommand::try_from(command)
            .map(ControlCommand::response_payload_len)
            .unwrap_or(0),
        FrameVariant::Data => {
            if command == ALL_UPDATE_CODE {
                return DataCommand::RequestAll.response_payload_len();
            }
            DataCommand::try_from(command)
                .map(DataCommand::response_payload_len)
                .unwrap_or(0)
        }
    }
}

/// Reads a big-endian `u32` at `offset`.
pub fn read_u32(payload: &[u8], offset: usize) -> Result<u32, FrameError> {
    let bytes = require_len(payload, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Reads a big-endian `u16` at `offset`.
pub fn read_u16(payload: &[u8], offset: usize) -> Result<u16, FrameError> {
    let bytes = require_len(payload, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads one byte at `offset`.
pub fn read_u8(payload: &[u8], offset: usize) -> Result<u8, FrameError> {
    let bytes = require_len(payload, offset, 1)?;
    Ok(bytes[0])
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn require_len(payload: &[u8], offset: usize, needed: usize) -> Result<&[u8], FrameError> {
    payload
        .get(offset..offset + needed)
        .ok_or(FrameError::PayloadTooShort {
            offset,
            needed,
            available: payload.len(),
        })
}

fn decode_command(raw: &[u8]) -> Result<String, FrameError> {
    if !raw.is_ascii() {
        return Err(FrameError::NonAsciiCommand);
    }
    let trimmed: Vec<u8> = raw.iter().copied().take_while(|&b| b != 0x00).collect();
    // is_ascii was checked above, so this cannot fail
    String::from_utf8(trimmed).map_err(|_| FrameError::NonAsciiCommand)
}

fn push_command(buf: &mut Vec<u8>, command: &str) {
    let bytes = command.as_bytes();
    for i in 0..COMMAND_LEN {
        buf.push(bytes.get(i).copied().unwrap_or(0x00));
    }
}
