//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding vendor payloads or updating the memory shadow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload too short for {what}: need {needed} bytes, have {available}")]
    PayloadTooShort {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("write of {len} bytes at 0x{offset:x} exceeds memory capacity 0x{capacity:x}")]
    OutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },
}
