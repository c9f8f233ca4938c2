//! Legacy pcap container reader
//!
//! USBPcap writes classic (non-ng) pcap files with microsecond timestamps in
//! little-endian order. Only that exact magic is accepted; records are handed
//! out one at a time and never re-read.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use tracing::{debug, info, warn};

use crate::error::AnalyzerError;

/// Magic number of a little-endian, microsecond-resolution pcap file
pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;

/// Size of the pcap global header
pub const PCAP_HEADER_LEN: usize = 24;

/// Read buffer size; any record up to this size (header included) is
/// delivered, comfortably above USBPcap's 65535-byte default snaplen
pub const READER_CAPACITY: usize = 1 << 20;

/// pcap global header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHeader {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub link_type: i32,
}

/// One captured transfer record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub captured_len: u32,
    pub original_len: u32,
    pub data: Vec<u8>,
}

/// Forward-only reader over the records of a capture
pub struct CaptureReader<R: Read> {
    reader: LegacyPcapReader<R>,
    header: CaptureHeader,
    bytes_consumed: u64,
    records: u64,
    finished: bool,
    stop_reason: Option<AnalyzerError>,
}

impl CaptureReader<File> {
    /// Open a capture file and validate its global header
    pub fn open(path: &Path) -> Result<Self, AnalyzerError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<R: Read> CaptureReader<R> {
    /// Wrap any byte source holding a capture image
    pub fn from_reader(source: R) -> Result<Self, AnalyzerError> {
        let mut reader = LegacyPcapReader::new(READER_CAPACITY, source)
            .map_err(|e| AnalyzerError::Format(format!("unreadable capture header: {:?}", e)))?;

        // The global header is always handed out as the first block
        let (offset, header) = match reader.next() {
            Ok((offset, PcapBlockOwned::LegacyHeader(hdr))) => (
                offset,
                CaptureHeader {
                    magic: hdr.magic_number,
                    version_major: hdr.version_major,
                    version_minor: hdr.version_minor,
                    thiszone: hdr.thiszone,
                    sigfigs: hdr.sigfigs,
                    snaplen: hdr.snaplen,
                    link_type: hdr.network.0,
                },
            ),
            Ok(_) => {
                return Err(AnalyzerError::Format(
                    "capture does not start with a global header".to_string(),
                ))
            }
            Err(e) => {
                return Err(AnalyzerError::Format(format!(
                    "unreadable capture header: {:?}",
                    e
                )))
            }
        };
        reader.consume(offset);

        if header.magic != PCAP_MAGIC {
            return Err(AnalyzerError::Format(format!(
                "bad magic 0x{:08x}, expected 0x{:08x}",
                header.magic, PCAP_MAGIC
            )));
        }

        info!(
            "pcap v{}.{}, snaplen {}, link type {}",
            header.version_major, header.version_minor, header.snaplen, header.link_type
        );

        Ok(Self {
            reader,
            header,
            bytes_consumed: offset as u64,
            records: 0,
            finished: false,
            stop_reason: None,
        })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    /// Total bytes of the capture consumed so far, global header included
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Number of records handed out so far
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Why reading stopped before the end of the file, if it did
    pub fn stop_reason(&self) -> Option<&AnalyzerError> {
        self.stop_reason.as_ref()
    }

    /// Read the next complete record.
    ///
    /// Returns `None` at end of stream, on a truncated trailing record and on
    /// a record too large to buffer (see `stop_reason`); partial records are
    /// never surfaced.
    pub fn next_record(&mut self) -> Option<TransferRecord> {
        while !self.finished {
            // Copy what we need out of the block before consume/refill
            let result = self.reader.next();

            match result {
                Ok((offset, block)) => {
                    let record = match &block {
                        PcapBlockOwned::Legacy(lp) => Some(TransferRecord {
                            ts_sec: lp.ts_sec,
                            ts_usec: lp.ts_usec,
                            captured_len: lp.caplen,
                            original_len: lp.origlen,
                            data: lp.data.to_vec(),
                        }),
                        _ => None,
                    };

                    self.reader.consume(offset);
                    self.bytes_consumed += offset as u64;

                    if let Some(record) = record {
                        self.records += 1;
                        return Some(record);
                    }
                }
                Err(PcapError::Eof) => self.finished = true,
                Err(PcapError::Incomplete(_)) => {
                    // An exhausted source turns the next Incomplete into
                    // UnexpectedEof, so this cannot spin
                    if let Err(e) = self.reader.refill() {
                        warn!("capture refill failed: {:?}", e);
                        self.finished = true;
                    }
                }
                Err(PcapError::BufferTooSmall) => {
                    let e = AnalyzerError::RecordTooLarge {
                        index: self.records,
                        capacity: READER_CAPACITY,
                    };
                    warn!("{}, stopping", e);
                    self.stop_reason = Some(e);
                    self.finished = true;
                }
                Err(e) => {
                    debug!("capture stream ended: {:?}", e);
                    let e = AnalyzerError::TruncatedCapture {
                        records: self.records,
                    };
                    warn!("{}", e);
                    self.stop_reason = Some(e);
                    self.finished = true;
                }
            }
        }

        None
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = TransferRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Serialize a pcap global header (little-endian, microsecond timestamps)
#[cfg(test)]
pub(crate) fn encode_header(snaplen: u32, link_type: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(PCAP_HEADER_LEN);
    out.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    out.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    out.extend_from_slice(&snaplen.to_le_bytes());
    out.extend_from_slice(&link_type.to_le_bytes());
    out
}

/// Serialize one pcap record (per-record header + data)
#[cfg(test)]
pub(crate) fn encode_record(ts_sec: u32, ts_usec: u32, data: &[u8]) -> Vec<u8> {
    let len = data.len() as u32;
    let mut out = Vec::with_capacity(16 + data.len());
    out.extend_from_slice(&ts_sec.to_le_bytes());
    out.extend_from_slice(&ts_usec.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
    out
}
