//! Shadow of the device's configuration memory
//!
//! The shadow is built purely from the writes observed in a capture. Each
//! commit reports which bytes actually changed so a long SET_DATA burst can be
//! reduced to the handful of fields the host touched.

use serde::Serialize;
use tracing::debug;

use crate::error::ProtocolError;

/// Default shadow size, covers the whole addressable configuration space
/// (the software configuration area ends at 0x1B5C).
pub const DEFAULT_CAPACITY: usize = 0x10000;

/// A maximal run of bytes whose content changed in one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRange {
    pub offset: usize,
    pub old: Vec<u8>,
    pub new: Vec<u8>,
}

impl ChangeRange {
    pub fn len(&self) -> usize {
        self.new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
    }

    /// One past the last changed address
    pub fn end(&self) -> usize {
        self.offset + self.len()
    }
}

/// Compute the changed runs between `old` and `new`, addressed from `base`.
///
/// A run opens at the first differing byte and closes at the next equal one;
/// a run still open at the end of the span is included.
pub fn diff_ranges(base: usize, old: &[u8], new: &[u8]) -> Vec<ChangeRange> {
    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, (o, n)) in old.iter().zip(new).enumerate() {
        match (o != n, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                ranges.push(ChangeRange {
                    offset: base + start,
                    old: old[start..i].to_vec(),
                    new: new[start..i].to_vec(),
                });
                run_start = None;
            }
            _ => {}
        }
    }

    let end = old.len().min(new.len());
    if let Some(start) = run_start {
        ranges.push(ChangeRange {
            offset: base + start,
            old: old[start..end].to_vec(),
            new: new[start..end].to_vec(),
        });
    }

    ranges
}

/// Fixed-capacity device memory shadow
#[derive(Debug, Clone)]
pub struct DeviceMemory {
    data: Vec<u8>,
    high_water: usize,
}

impl Default for DeviceMemory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DeviceMemory {
    /// Zero-initialised shadow of `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            high_water: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// One past the highest address ever written
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    /// Bytes at `offset..offset+len`, if inside the shadow
    pub fn read(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.data.get(offset..offset.checked_add(len)?)
    }

    /// Everything up to the high-water mark, for dumping
    pub fn image(&self) -> &[u8] {
        &self.data[..self.high_water]
    }

    /// Overwrite `offset..offset+new.len()` and return the changed runs.
    ///
    /// Fails without modifying anything if the write would leave the shadow.
    pub fn commit(&mut self, offset: usize, new: &[u8]) -> Result<Vec<ChangeRange>, ProtocolError> {
        let end = offset
            .checked_add(new.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(ProtocolError::OutOfRange {
                offset,
                len: new.len(),
                capacity: self.data.len(),
            })?;

        let changes = diff_ranges(offset, &self.data[offset..end], new);
        self.data[offset..end].copy_from_slice(new);

        if !new.is_empty() && end > self.high_water {
            self.high_water = end;
        }

        debug!(
            "commit 0x{:x}+{}: {} changed range(s), high water 0x{:x}",
            offset,
            new.len(),
            changes.len(),
            self.high_water
        );

        Ok(changes)
    }
}
