//! Frame layouts, status codes, and the request/response frame types.
//!
//! Two fixed-length request layouts coexist.  Which one a connection speaks is
//! decided by the port it arrived on, never by frame content.
//!
//! ```text
//! Control request:  [cmd:2][payload:4][0x0A]          = 7 bytes
//! Data request:     [cmd:2][payload:14][0x0A]         = 17 bytes
//! Response:         [cmd:2][status:1][payload:N][0x0A]
//! ```
//!
//! All multi-byte integers are big-endian.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Terminator byte closing every request and response frame.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Width of the command identifier in bytes.
pub const COMMAND_LEN: usize = 2;

/// Payload width of a control request.
pub const CONTROL_PAYLOAD_LEN: usize = 4;

/// Payload width of a data request.
pub const DATA_PAYLOAD_LEN: usize = 14;

/// Largest success payload a control response carries (five u32 stock values).
pub const CONTROL_MAX_RESPONSE_PAYLOAD: usize = 20;

/// Largest success payload a data response carries.
pub const DATA_MAX_RESPONSE_PAYLOAD: usize = 14;

/// Bytes surrounding a response payload: command, status, terminator.
pub const RESPONSE_OVERHEAD: usize = COMMAND_LEN + 1 + 1;

// ── Frame variants ────────────────────────────────────────────────────────────

/// The two frame layouts understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameVariant {
    /// Short control frame: 4-byte payload, u32 fields.
    Control,
    /// Long data frame: 14-byte payload, u16 fields.
    Data,
}

impl FrameVariant {
    /// Fixed request payload width for this layout.
    pub const fn payload_len(self) -> usize {
        match self {
            FrameVariant::Control => CONTROL_PAYLOAD_LEN,
            FrameVariant::Data => DATA_PAYLOAD_LEN,
        }
    }

    /// Total request frame length, terminator included.
    pub const fn request_len(self) -> usize {
        COMMAND_LEN + self.payload_len() + 1
    }

    /// Upper bound on a success payload in a response.
    pub const fn max_response_payload(self) -> usize {
        match self {
            FrameVariant::Control => CONTROL_MAX_RESPONSE_PAYLOAD,
            FrameVariant::Data => DATA_MAX_RESPONSE_PAYLOAD,
        }
    }

    /// Short lowercase name used in log lines.
    pub const fn name(self) -> &'static str {
        match self {
            FrameVariant::Control => "control",
            FrameVariant::Data => "data",
        }
    }
}

impl std::fmt::Display for FrameVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Status codes ──────────────────────────────────────────────────────────────

/// One-byte result code carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0x00,
    /// Business failure: capacity exceeded, insufficient stock, robot busy.
    Failure = 0x01,
    InvalidCmd = 0x02,
    InvalidData = 0x03,
    /// Unexpected fault inside a handler.  Distinct from `Failure`.
    InternalError = 0xFF,
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(StatusCode::Success),
            0x01 => Ok(StatusCode::Failure),
            0x02 => Ok(StatusCode::InvalidCmd),
            0x03 => Ok(StatusCode::InvalidData),
            0xFF => Ok(StatusCode::InternalError),
            _ => Err(()),
        }
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// A decoded request: the command identifier and the fixed-width payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// One or two ASCII characters; trailing zero fill is stripped.
    pub command: String,
    /// Exactly [`FrameVariant::payload_len`] bytes.
    pub payload: Vec<u8>,
}

/// A response before encoding (or after decoding on the console side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub command: String,
    pub status: StatusCode,
    /// Empty unless `status` is [`StatusCode::Success`].
    pub payload: Vec<u8>,
}

impl ResponseFrame {
    /// A success response carrying `payload`.
    pub fn success(command: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            command: command.into(),
            status: StatusCode::Success,
            payload,
        }
    }

    /// A payload-less response with the given status.
    pub fn status_only(command: impl Into<String>, status: StatusCode) -> Self {
        Self {
            command: command.into(),
            status,
            payload: Vec::new(),
        }
    }
}
