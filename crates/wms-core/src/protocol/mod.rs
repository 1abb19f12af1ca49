//! Protocol module containing frame types, command codes, and the binary codec.

pub mod codec;
pub mod command;
pub mod frame;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, response_payload_len,
    FrameError,
};
pub use command::{ControlCommand, DataCommand};
pub use frame::*;
