//! Focusrite Scarlett vendor protocol decoding
//!
//! This crate holds everything about the device's proprietary control
//! protocol that does not depend on how the traffic was captured:
//!
//! - the opcode table and control request codes (`protocol`)
//! - envelope and payload parsers (`command`)
//! - the configuration memory shadow (`memory`)
//! - mixer gain conversions (`gain`)
//! - labels for the software configuration area (`layout`)

pub mod command;
pub mod error;
pub mod gain;
pub mod layout;
pub mod memory;
pub mod protocol;

pub use command::{take, DataAccess, Envelope, MixUpdate, ENVELOPE_LEN};
#[cfg(any(test, feature = "test-support"))]
pub use command::build_packet;
pub use error::ProtocolError;
pub use gain::{f32_to_mixer_level, float_bits_to_mixer_level, gain_code_to_db};
pub use memory::{diff_ranges, ChangeRange, DeviceMemory, DEFAULT_CAPACITY};
pub use protocol::{cmd, request, Opcode};
