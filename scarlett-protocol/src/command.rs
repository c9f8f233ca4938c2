//! Vendor command envelope and opcode payload parsers
//!
//! Every vendor command rides inside a class/interface control transfer and
//! starts with a fixed 16-byte little-endian envelope:
//!
//! ```text
//! Offset  Size  Field
//! 0       4     opcode
//! 4       2     size      (payload bytes following the envelope)
//! 6       2     seq
//! 8       4     error
//! 12      4     pad
//! ```
//!
//! All parsers here are bounds-checked and return the unconsumed tail so the
//! caller can dump whatever was not decoded.

use serde::{Serialize, Serializer};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::ProtocolError;
use crate::protocol::Opcode;

/// Size of the vendor envelope in bytes
pub const ENVELOPE_LEN: usize = 16;
/// Size of the (offset, bytes) header of GET_DATA / SET_DATA
pub const DATA_ACCESS_LEN: usize = 8;
/// Size of the channel field leading a SET_MIX payload
pub const MIX_CHANNEL_LEN: usize = 2;

/// Split `n` bytes off the front of `data`.
pub fn take<'a>(
    data: &'a [u8],
    n: usize,
    what: &'static str,
) -> Result<(&'a [u8], &'a [u8]), ProtocolError> {
    if data.len() < n {
        return Err(ProtocolError::PayloadTooShort {
            what,
            needed: n,
            available: data.len(),
        });
    }
    Ok(data.split_at(n))
}

// =============================================================================
// Wire structs (zerocopy)
// =============================================================================

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct EnvelopeHeader {
    cmd: U32,
    size: U16,
    seq: U16,
    error: U32,
    pad: U32,
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct DataAccessHeader {
    offset: U32,
    bytes: U32,
}

// =============================================================================
// Envelope
// =============================================================================

fn serialize_opcode<S: Serializer>(op: &Opcode, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(op)
}

/// Decoded vendor command envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Envelope {
    #[serde(serialize_with = "serialize_opcode")]
    pub opcode: Opcode,
    /// Declared payload size following the envelope
    pub size: u16,
    pub seq: u16,
    pub error: u32,
    pub pad: u32,
}

impl Envelope {
    #[cfg(any(test, feature = "test-support"))]
    pub fn new(opcode: Opcode, size: u16, seq: u16) -> Self {
        Self {
            opcode,
            size,
            seq,
            error: 0,
            pad: 0,
        }
    }

    /// Parse the envelope from the front of `data`, returning the rest.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (hdr, rest) = EnvelopeHeader::read_from_prefix(data).map_err(|_| {
            ProtocolError::PayloadTooShort {
                what: "vendor envelope",
                needed: ENVELOPE_LEN,
                available: data.len(),
            }
        })?;

        Ok((
            Self {
                opcode: Opcode::from(hdr.cmd.get()),
                size: hdr.size.get(),
                seq: hdr.seq.get(),
                error: hdr.error.get(),
                pad: hdr.pad.get(),
            },
            rest,
        ))
    }

    /// Slice the declared payload out of the bytes following the envelope.
    pub fn payload<'a>(&self, rest: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        take(rest, self.size as usize, "declared payload").map(|(payload, _)| payload)
    }

    /// Serialize the envelope to its 16-byte wire form
    #[cfg(any(test, feature = "test-support"))]
    pub fn to_bytes(&self) -> [u8; ENVELOPE_LEN] {
        let hdr = EnvelopeHeader {
            cmd: U32::new(self.opcode.code()),
            size: U16::new(self.size),
            seq: U16::new(self.seq),
            error: U32::new(self.error),
            pad: U32::new(self.pad),
        };
        let mut out = [0u8; ENVELOPE_LEN];
        out.copy_from_slice(hdr.as_bytes());
        out
    }
}

/// Build a complete vendor packet: envelope followed by `payload`.
///
/// Payloads longer than `u16::MAX` are declared as `u16::MAX`.
#[cfg(any(test, feature = "test-support"))]
pub fn build_packet(opcode: Opcode, seq: u16, payload: &[u8]) -> Vec<u8> {
    let size = u16::try_from(payload.len()).unwrap_or(u16::MAX);
    let mut out = Envelope::new(opcode, size, seq).to_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

// =============================================================================
// GET_DATA / SET_DATA
// =============================================================================

/// (offset, byte count) header shared by GET_DATA and SET_DATA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataAccess {
    pub offset: u32,
    pub bytes: u32,
}

impl DataAccess {
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (hdr, rest) = DataAccessHeader::read_from_prefix(payload).map_err(|_| {
            ProtocolError::PayloadTooShort {
                what: "data access header",
                needed: DATA_ACCESS_LEN,
                available: payload.len(),
            }
        })?;
        Ok((
            Self {
                offset: hdr.offset.get(),
                bytes: hdr.bytes.get(),
            },
            rest,
        ))
    }

    /// SET_DATA payload carrying `data` at this access' offset
    #[cfg(any(test, feature = "test-support"))]
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        let hdr = DataAccessHeader {
            offset: U32::new(self.offset),
            bytes: U32::new(self.bytes),
        };
        let mut out = hdr.as_bytes().to_vec();
        out.extend_from_slice(data);
        out
    }

    /// Split exactly `bytes` data bytes off `rest` (SET_DATA semantics).
    pub fn data<'a>(&self, rest: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        take(rest, self.bytes as usize, "data bytes").map(|(data, _)| data)
    }

    /// Data bytes embedded in a request, clipped to what is present.
    ///
    /// GET_DATA requests normally carry no data; when they do, up to `bytes`
    /// of it is used as the snapshot.
    pub fn embedded<'a>(&self, rest: &'a [u8]) -> &'a [u8] {
        &rest[..rest.len().min(self.bytes as usize)]
    }
}

// =============================================================================
// SET_MIX
// =============================================================================

/// SET_MIX request: one mixer output and its input gain codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MixUpdate {
    pub channel: u16,
    pub gains: Vec<u16>,
}

impl MixUpdate {
    /// Parse a SET_MIX payload already cut to the envelope's declared size.
    ///
    /// Returns the odd trailing byte, if any, as the unconsumed tail.
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (channel, rest) = take(payload, MIX_CHANNEL_LEN, "mix channel")?;
        let chunks = rest.chunks_exact(2);
        let tail = chunks.remainder();
        let gains = chunks.map(|c| u16::from_le_bytes([c[0], c[1]])).collect();

        Ok((
            Self {
                channel: u16::from_le_bytes([channel[0], channel[1]]),
                gains,
            },
            tail,
        ))
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.channel.to_le_bytes().to_vec();
        for gain in &self.gains {
            out.extend_from_slice(&gain.to_le_bytes());
        }
        out
    }
}
