//! Per-session decode context
//!
//! Everything that must survive from one record to the next lives here and is
//! owned by the session loop; decode steps borrow it mutably.

use std::fmt;

use scarlett_protocol::DeviceMemory;
use serde::Serialize;

use super::capture::TransferRecord;
use super::correlator::ControlCorrelator;

/// Time since the first record of the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Elapsed {
    pub secs: u64,
    pub micros: u32,
}

impl Elapsed {
    pub fn from_micros(us: u64) -> Self {
        Self {
            secs: us / 1_000_000,
            micros: (us % 1_000_000) as u32,
        }
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

fn record_micros(record: &TransferRecord) -> u64 {
    u64::from(record.ts_sec) * 1_000_000 + u64::from(record.ts_usec)
}

/// Protocol state for one decode session
#[derive(Debug)]
pub struct ProtocolState {
    /// Timestamp of the first record, latched once
    initialized_clock: Option<u64>,
    pub correlator: ControlCorrelator,
    /// Offset of an outstanding GET_DATA request
    pub pending_read_offset: Option<u32>,
    pub memory: DeviceMemory,
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::new(DeviceMemory::default())
    }
}

impl ProtocolState {
    pub fn new(memory: DeviceMemory) -> Self {
        Self {
            initialized_clock: None,
            correlator: ControlCorrelator::new(),
            pending_read_offset: None,
            memory,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(DeviceMemory::with_capacity(capacity))
    }

    /// Normalise a record timestamp against the first one seen.
    ///
    /// Records stamped before the first one clamp to zero.
    pub fn elapsed(&mut self, record: &TransferRecord) -> Elapsed {
        let now = record_micros(record);
        let base = *self.initialized_clock.get_or_insert(now);
        Elapsed::from_micros(now.saturating_sub(base))
    }
}
