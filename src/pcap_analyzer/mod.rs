//! USBPcap analyzer for the Focusrite Scarlett vendor protocol
//!
//! This module reads classic pcap captures taken with USBPcap, classifies
//! every USB transfer, pairs control SETUP/COMPLETE records, decodes the
//! vendor command envelopes they carry and mirrors configuration writes into
//! a shadow of the device memory.
//!
//! # Example
//!
//! ```ignore
//! use scarlett_sniffer::pcap_analyzer::{PcapAnalyzer, OutputFormat, PacketFilter};
//!
//! let analyzer = PcapAnalyzer::new(OutputFormat::Text, PacketFilter::All);
//! let summary = analyzer.analyze_file(Path::new("capture.pcap"))?;
//! summary.write_memory_image(Path::new("memory.bin"))?;
//! ```

mod capture;
mod correlator;
mod printer;
mod state;
mod usb_urb;
mod vendor;

pub use capture::{CaptureHeader, CaptureReader, TransferRecord, READER_CAPACITY};
pub use correlator::{ControlCorrelator, CorrelatorState, PendingRequest};
pub use printer::{OutputFormat, PacketFilter, Printer, TransferReport};
pub use state::{Elapsed, ProtocolState};
pub use usb_urb::{
    parse_transfer_detail, parse_urb_header, parse_usb_packet, ControlSetup, ControlStage,
    Direction, IsoPacket, IsochHeader, TransferDetail, TransferType, UsbFunction, UsbPacket,
    UsbUrb,
};
pub use vendor::{decode_vendor, qualify, MixGain, Side, VendorDecode, VendorDetail, VendorReport};

use std::fs;
use std::io::Read;
use std::path::Path;

use scarlett_protocol::DEFAULT_CAPACITY;
use tracing::{debug, info};

use crate::error::AnalyzerError;

/// Per-kind record counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketStats {
    pub isochronous: u64,
    pub interrupt: u64,
    pub control: u64,
    pub bulk: u64,
    pub unknown: u64,
    pub vendor_requests: u64,
    pub vendor_responses: u64,
    pub decode_errors: u64,
}

impl PacketStats {
    fn record(&mut self, report: &TransferReport) {
        match &report.detail {
            Some(TransferDetail::Isochronous(_)) => self.isochronous += 1,
            Some(TransferDetail::Interrupt) => self.interrupt += 1,
            Some(TransferDetail::Control { .. }) => self.control += 1,
            Some(TransferDetail::Bulk) => self.bulk += 1,
            Some(TransferDetail::Unknown(_)) | None => self.unknown += 1,
        }
        match report.vendor.as_ref().map(|v| v.side) {
            Some(Side::Request) => self.vendor_requests += 1,
            Some(Side::Response) => self.vendor_responses += 1,
            None => {}
        }
        if report.error.is_some() {
            self.decode_errors += 1;
        }
    }

    fn print_summary(&self) {
        eprintln!("\nRecord statistics:");
        eprintln!("  Isochronous:        {}", self.isochronous);
        eprintln!("  Interrupt:          {}", self.interrupt);
        eprintln!("  Control:            {}", self.control);
        eprintln!("  Bulk:               {}", self.bulk);
        eprintln!("  Unknown:            {}", self.unknown);
        eprintln!("  Vendor requests:    {}", self.vendor_requests);
        eprintln!("  Vendor responses:   {}", self.vendor_responses);
        eprintln!("  Decode errors:      {}", self.decode_errors);
    }
}

/// Outcome of a full pass over a capture
#[derive(Debug)]
pub struct AnalysisSummary {
    pub records: u64,
    /// Capture bytes consumed, global header included
    pub bytes_consumed: u64,
    pub stats: PacketStats,
    /// Why reading stopped before the end of the capture, if it did
    pub stopped_early: Option<String>,
    /// Session state at end of stream, shadow included
    pub state: ProtocolState,
}

impl AnalysisSummary {
    pub fn high_water_mark(&self) -> usize {
        self.state.memory.high_water_mark()
    }

    /// Write the reconstructed memory image (`shadow[0..high_water_mark]`)
    pub fn write_memory_image(&self, path: &Path) -> Result<(), AnalyzerError> {
        let image = self.state.memory.image();
        fs::write(path, image)?;
        info!("wrote {} bytes of device memory to {}", image.len(), path.display());
        Ok(())
    }

    /// Summary lines go to stderr; stdout carries only per-record output.
    fn print(&self, verbose: bool) {
        eprintln!(
            "\n--- Analyzed {} records, {} bytes ---",
            self.records, self.bytes_consumed
        );
        if let Some(reason) = &self.stopped_early {
            eprintln!("Stopped early: {}", reason);
        }
        eprintln!("Overall read bytes: {}", self.bytes_consumed);
        eprintln!("Memory high-water mark: 0x{:x}", self.high_water_mark());
        if verbose {
            self.stats.print_summary();
        }
    }
}

/// Decode one record against the session state.
///
/// Never fails: structural errors end decoding of this record early, are
/// noted in the report, and the undecoded bytes are kept for the raw dump.
pub fn decode_record(
    state: &mut ProtocolState,
    index: u64,
    record: &TransferRecord,
) -> TransferReport {
    let elapsed = state.elapsed(record);
    let mut report = TransferReport::new(index, elapsed, record.captured_len);

    let (urb, rest) = match parse_urb_header(&record.data) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("record {}: {}", index, e);
            report.error = Some(e.to_string());
            report.raw = record.data.clone();
            return report;
        }
    };

    let (detail, payload) = match parse_transfer_detail(&urb, rest) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("record {}: {}", index, e);
            report.urb = Some(urb);
            report.error = Some(e.to_string());
            report.raw = rest.to_vec();
            return report;
        }
    };

    let side = detail.control().and_then(|(stage, setup)| {
        let resolved = state.correlator.observe(stage, setup);
        qualify(stage, setup, resolved)
    });

    report.urb = Some(urb);
    report.detail = Some(detail);

    let mut raw = payload;
    if let Some(side) = side {
        let decoded = decode_vendor(state, side, payload);
        if let Some(e) = decoded.error {
            debug!("record {}: {}", index, e);
            report.error = Some(AnalyzerError::from(e).to_string());
        }
        report.vendor = Some(decoded.report);
        raw = decoded.rest;
    }
    report.raw = raw.to_vec();

    report
}

/// Capture analyzer for Scarlett USB traffic
pub struct PcapAnalyzer {
    printer: Printer,
    verbose: bool,
    shadow_capacity: usize,
}

impl PcapAnalyzer {
    /// Create a new analyzer with specified output format and filter
    pub fn new(format: OutputFormat, filter: PacketFilter) -> Self {
        Self {
            printer: Printer::new(format, filter),
            verbose: false,
            shadow_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Print per-kind record statistics at the end
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.printer = self.printer.with_color(color);
        self
    }

    pub fn with_ascii(mut self, ascii: bool) -> Self {
        self.printer = self.printer.with_ascii(ascii);
        self
    }

    /// Size of the device memory shadow
    pub fn with_shadow_capacity(mut self, capacity: usize) -> Self {
        self.shadow_capacity = capacity;
        self
    }

    /// Analyze a capture file and print decoded records
    pub fn analyze_file(&self, path: &Path) -> Result<AnalysisSummary, AnalyzerError> {
        let reader = CaptureReader::open(path)?;
        Ok(self.analyze(reader))
    }

    /// Decode and print every record of an open capture
    pub fn analyze<R: Read>(&self, mut reader: CaptureReader<R>) -> AnalysisSummary {
        let mut state = ProtocolState::with_capacity(self.shadow_capacity);
        let mut stats = PacketStats::default();
        let mut index = 0u64;

        while let Some(record) = reader.next_record() {
            let report = decode_record(&mut state, index, &record);
            stats.record(&report);
            self.printer.print(&report);
            index += 1;
        }

        let summary = AnalysisSummary {
            records: index,
            bytes_consumed: reader.bytes_consumed(),
            stats,
            stopped_early: reader.stop_reason().map(ToString::to_string),
            state,
        };
        summary.print(self.verbose);
        summary
    }
}

/// Options for a CLI analysis run
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub format: OutputFormat,
    pub filter: PacketFilter,
    pub verbose: bool,
    pub color: bool,
    pub ascii: bool,
    pub shadow_capacity: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            filter: PacketFilter::All,
            verbose: false,
            color: true,
            ascii: true,
            shadow_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// CLI entry point for capture analysis
pub fn run_pcap_analysis(
    path: &Path,
    options: &AnalysisOptions,
    output: Option<&Path>,
) -> Result<AnalysisSummary, AnalyzerError> {
    let analyzer = PcapAnalyzer::new(options.format, options.filter)
        .with_verbose(options.verbose)
        .with_color(options.color)
        .with_ascii(options.ascii)
        .with_shadow_capacity(options.shadow_capacity);

    let summary = analyzer.analyze_file(path)?;
    if let Some(output) = output {
        summary.write_memory_image(output)?;
    }
    Ok(summary)
}
