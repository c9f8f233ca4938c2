//! Output formatting for the capture analyzer
//!
//! One report per transfer record, rendered either as a single text line or
//! as a JSON object. Undecoded bytes are always dumped so that unknown
//! traffic stays visible.

use std::fmt::Write as _;
use std::str::FromStr;

use crossterm::style::{Color, Stylize};
use scarlett_protocol::layout;
use scarlett_protocol::{ChangeRange, Opcode};
use serde::{Serialize, Serializer};
use tracing::warn;

use super::state::Elapsed;
use super::usb_urb::{IsochHeader, TransferDetail, UsbUrb};
use super::vendor::{VendorDetail, VendorReport};

/// Output format for the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Record filter for selective display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFilter {
    All,
    /// Control transfers only
    Control,
    /// Records carrying a vendor envelope
    Vendor,
    /// Vendor records with one opcode
    Opcode(Opcode),
}

impl FromStr for PacketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "control" | "ctl" => Ok(Self::Control),
            "vendor" | "focusrite" => Ok(Self::Vendor),
            s if s.starts_with("op=") || s.starts_with("0x") => {
                let op = s.strip_prefix("op=").unwrap_or(s);
                if let Some(hex) = op.strip_prefix("0x") {
                    u32::from_str_radix(hex, 16)
                        .map(|code| Self::Opcode(Opcode::from(code)))
                        .map_err(|e| format!("Invalid opcode: {}", e))
                } else {
                    Opcode::from_name(op)
                        .map(Self::Opcode)
                        .ok_or_else(|| format!("Unknown opcode name: {}", op))
                }
            }
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

impl PacketFilter {
    pub fn matches(&self, report: &TransferReport) -> bool {
        match self {
            Self::All => true,
            Self::Control => matches!(report.detail, Some(TransferDetail::Control { .. })),
            Self::Vendor => report.vendor.is_some(),
            Self::Opcode(op) => report
                .vendor
                .as_ref()
                .and_then(|v| v.envelope)
                .is_some_and(|env| env.opcode == *op),
        }
    }
}

fn serialize_hex<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&hex_string(data))
}

fn hex_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Everything decoded from one transfer record
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    /// Zero-based record number
    pub index: u64,
    pub elapsed: Elapsed,
    pub captured_len: u32,
    pub urb: Option<UsbUrb>,
    pub detail: Option<TransferDetail>,
    pub vendor: Option<VendorReport>,
    /// First recoverable error hit while decoding
    pub error: Option<String>,
    /// Bytes left undecoded
    #[serde(serialize_with = "serialize_hex")]
    pub raw: Vec<u8>,
}

impl TransferReport {
    pub fn new(index: u64, elapsed: Elapsed, captured_len: u32) -> Self {
        Self {
            index,
            elapsed,
            captured_len,
            urb: None,
            detail: None,
            vendor: None,
            error: None,
            raw: Vec::new(),
        }
    }
}

/// Output printer
pub struct Printer {
    format: OutputFormat,
    filter: PacketFilter,
    color: bool,
    ascii: bool,
}

impl Printer {
    pub fn new(format: OutputFormat, filter: PacketFilter) -> Self {
        Self {
            format,
            filter,
            color: true,
            ascii: true,
        }
    }

    /// Highlight new bytes and errors with terminal colours
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Append a printable rendering after the raw dump
    pub fn with_ascii(mut self, ascii: bool) -> Self {
        self.ascii = ascii;
        self
    }

    /// Render a report, or `None` if the filter hides it
    pub fn render(&self, report: &TransferReport) -> Option<String> {
        if !self.filter.matches(report) {
            return None;
        }

        match self.format {
            OutputFormat::Text => Some(self.render_text(report)),
            OutputFormat::Json => match serde_json::to_string(report) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!("record {}: JSON encoding failed: {}", report.index, e);
                    None
                }
            },
        }
    }

    pub fn print(&self, report: &TransferReport) {
        if let Some(line) = self.render(report) {
            println!("{}", line);
        }
    }

    /// Single-line text rendering
    pub fn render_text(&self, report: &TransferReport) -> String {
        let mut line = report.elapsed.to_string();

        if let Some(urb) = &report.urb {
            let _ = write!(
                line,
                " {} hdr={} status=0x{:08x} {}",
                urb.address(),
                urb.header_len,
                urb.status,
                urb.function
            );
        }

        if let Some(detail) = &report.detail {
            line.push(' ');
            line.push_str(&kind_fields(detail));
        }

        if let Some(vendor) = &report.vendor {
            line.push(' ');
            line.push_str(&self.vendor_fields(vendor));
        }

        if let Some(error) = &report.error {
            let note = format!("!! {}", error);
            line.push(' ');
            line.push_str(&self.paint(note, Color::Red));
        }

        if !report.raw.is_empty() {
            for b in &report.raw {
                let _ = write!(line, " {:02x}", b);
            }
            if self.ascii {
                let _ = write!(line, " |{}|", printable(&report.raw));
            }
        }

        line
    }

    fn paint(&self, text: String, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text
        }
    }

    fn vendor_fields(&self, vendor: &VendorReport) -> String {
        let Some(env) = &vendor.envelope else {
            return format!("FOCUSRITE[{}]", vendor.side.tag());
        };

        let mut out = format!(
            "FOCUSRITE[{} {} size={} seq=0x{:x} error={} pad={}]",
            vendor.side.tag(),
            env.opcode,
            env.size,
            env.seq,
            env.error,
            env.pad
        );

        match &vendor.detail {
            VendorDetail::Generic => {}
            VendorDetail::Ack => out.push_str(" ACK"),
            VendorDetail::Access { access } => {
                let _ = write!(
                    out,
                    " {}[offset=0x{:x}, bytes={}]",
                    env.opcode, access.offset, access.bytes
                );
            }
            VendorDetail::Write { access, changes } => {
                let _ = write!(
                    out,
                    " {}[offset=0x{:x}, bytes={}]",
                    env.opcode, access.offset, access.bytes
                );
                for change in changes {
                    out.push(' ');
                    out.push_str(&self.change_range(change));
                }
            }
            VendorDetail::ReadResult { offset, delivered } => match offset {
                Some(offset) => {
                    let _ = write!(
                        out,
                        " {}[offset=0x{:x}, delivered={}]",
                        env.opcode, offset, delivered
                    );
                }
                None => {
                    let _ = write!(out, " {}[offset=?, delivered={}]", env.opcode, delivered);
                }
            },
            VendorDetail::Mix { channel, gains } => {
                let _ = write!(out, " {}[channel={}", env.opcode, channel);
                for gain in gains {
                    let _ = write!(out, " {:.2}(0x{:04x})", gain.db, gain.code);
                }
                out.push(']');
            }
        }

        out
    }

    /// `@0x10[2]: 00 00 -> aa bb (sw.volume[3])`
    fn change_range(&self, change: &ChangeRange) -> String {
        let mut out = format!(
            "@0x{:x}[{}]: {} ->",
            change.offset,
            change.len(),
            spaced_hex(&change.old)
        );
        out.push(' ');
        out.push_str(&self.paint(spaced_hex(&change.new), Color::Green));
        if let Some(label) = layout::describe(change.offset) {
            let _ = write!(out, " ({})", label);
        }
        out
    }
}

fn kind_fields(detail: &TransferDetail) -> String {
    match detail {
        TransferDetail::Isochronous(Some(IsochHeader {
            start_frame,
            packets,
            errors,
            first,
        })) => format!(
            "ISOCHR start={} packets={} errors={} packet={{off={}, len={}, status=0x{:x}}}",
            start_frame, packets, errors, first.offset, first.length, first.status
        ),
        TransferDetail::Isochronous(None) => "ISOCHR".to_string(),
        TransferDetail::Interrupt => "INTERRUPT".to_string(),
        TransferDetail::Control { stage, setup } => match setup {
            Some(setup) => format!(
                "CONTROL {} {} value=0x{:x}, index={}, length={}",
                stage,
                setup.describe(),
                setup.w_value,
                setup.w_index,
                setup.w_length
            ),
            None => format!("CONTROL {}", stage),
        },
        TransferDetail::Bulk => "BULK".to_string(),
        TransferDetail::Unknown(t) => format!("tr=0x{:x}", t),
    }
}

fn spaced_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn printable(data: &[u8]) -> String {
    data.iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcap_analyzer::usb_urb::{ControlSetup, ControlStage, IsoPacket};
    use crate::pcap_analyzer::vendor::{MixGain, Side};
    use scarlett_protocol::{DataAccess, Envelope};

    fn vendor_report(opcode: Opcode, detail: VendorDetail) -> TransferReport {
        let mut report = TransferReport::new(3, Elapsed::from_micros(1_500_000), 64);
        report.detail = Some(TransferDetail::Control {
            stage: ControlStage::Setup,
            setup: Some(ControlSetup {
                bm_request_type: 0x21,
                b_request: 0x02,
                w_value: 0,
                w_index: 3,
                w_length: 26,
            }),
        });
        report.vendor = Some(VendorReport {
            side: Side::Request,
            envelope: Some(Envelope::new(opcode, 10, 7)),
            detail,
        });
        report
    }

    fn plain() -> Printer {
        Printer::new(OutputFormat::Text, PacketFilter::All).with_color(false)
    }

    #[test]
    fn test_packet_filter_parse() {
        assert_eq!(PacketFilter::from_str("all").unwrap(), PacketFilter::All);
        assert_eq!(
            PacketFilter::from_str("control").unwrap(),
            PacketFilter::Control
        );
        assert_eq!(
            PacketFilter::from_str("Vendor").unwrap(),
            PacketFilter::Vendor
        );
        assert_eq!(
            PacketFilter::from_str("op=set_data").unwrap(),
            PacketFilter::Opcode(Opcode::SetData)
        );
        assert_eq!(
            PacketFilter::from_str("op=0x2002").unwrap(),
            PacketFilter::Opcode(Opcode::SetMix)
        );
        assert_eq!(
            PacketFilter::from_str("0x4242").unwrap(),
            PacketFilter::Opcode(Opcode::Unknown(0x4242))
        );
        assert!(PacketFilter::from_str("op=bogus").is_err());
        assert!(PacketFilter::from_str("events").is_err());
    }

    #[test]
    fn test_filter_matches() {
        let report = vendor_report(Opcode::SetData, VendorDetail::Generic);
        assert!(PacketFilter::Vendor.matches(&report));
        assert!(PacketFilter::Control.matches(&report));
        assert!(PacketFilter::Opcode(Opcode::SetData).matches(&report));
        assert!(!PacketFilter::Opcode(Opcode::GetData).matches(&report));

        let mut bulk = TransferReport::new(0, Elapsed::default(), 0);
        bulk.detail = Some(TransferDetail::Bulk);
        assert!(!PacketFilter::Control.matches(&bulk));
        assert!(!PacketFilter::Vendor.matches(&bulk));
        assert!(plain().render(&bulk).is_some());
    }

    #[test]
    fn test_render_write_with_label() {
        let report = vendor_report(
            Opcode::SetData,
            VendorDetail::Write {
                access: DataAccess {
                    offset: 0x1c0,
                    bytes: 2,
                },
                changes: vec![ChangeRange {
                    offset: 0x1c0,
                    old: vec![0, 0],
                    new: vec![0xaa, 0xbb],
                }],
            },
        );
        let line = plain().render_text(&report);
        assert!(line.starts_with("1.500000 CONTROL SETUP 0x21[HTD CLASS IFACE]"));
        assert!(line.contains("FOCUSRITE[REQ SET_DATA size=10 seq=0x7 error=0 pad=0]"));
        assert!(line.contains("SET_DATA[offset=0x1c0, bytes=2]"));
        assert!(line.ends_with("@0x1c0[2]: 00 00 -> aa bb (sw.volume[1])"));
    }

    #[test]
    fn test_render_mix_and_raw() {
        let mut report = vendor_report(
            Opcode::SetMix,
            VendorDetail::Mix {
                channel: 2,
                gains: vec![
                    MixGain { code: 8192, db: 0.0 },
                    MixGain {
                        code: 0,
                        db: f64::NEG_INFINITY,
                    },
                ],
            },
        );
        report.raw = b"ok\x01".to_vec();
        let line = plain().render_text(&report);
        assert!(line.contains("SET_MIX[channel=2 0.00(0x2000) -inf(0x0000)]"));
        assert!(line.ends_with(" 6f 6b 01 |ok.|"));

        let no_ascii = plain().with_ascii(false).render_text(&report);
        assert!(no_ascii.ends_with(" 6f 6b 01"));
    }

    #[test]
    fn test_render_error_and_colour() {
        let mut report = TransferReport::new(0, Elapsed::default(), 5);
        report.error = Some("truncated".to_string());
        report.raw = vec![1, 2];

        assert_eq!(plain().render_text(&report), "0.000000 !! truncated 01 02 |..|");
        let coloured = Printer::new(OutputFormat::Text, PacketFilter::All).render_text(&report);
        assert!(coloured.contains("!! truncated"));
    }

    #[test]
    fn test_kind_fields() {
        let iso = TransferDetail::Isochronous(Some(IsochHeader {
            start_frame: 10,
            packets: 1,
            errors: 0,
            first: IsoPacket {
                offset: 0,
                length: 192,
                status: 0,
            },
        }));
        assert_eq!(
            kind_fields(&iso),
            "ISOCHR start=10 packets=1 errors=0 packet={off=0, len=192, status=0x0}"
        );
        assert_eq!(
            kind_fields(&TransferDetail::Control {
                stage: ControlStage::Other(7),
                setup: None
            }),
            "CONTROL stage=0x7"
        );
        assert_eq!(kind_fields(&TransferDetail::Unknown(9)), "tr=0x9");
    }

    #[test]
    fn test_json_output() {
        let mut report = vendor_report(Opcode::GetData, VendorDetail::Ack);
        report.raw = vec![0xde, 0xad];
        let printer = Printer::new(OutputFormat::Json, PacketFilter::All);
        let line = printer.render(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["raw"], "dead");
        assert_eq!(value["vendor"]["envelope"]["opcode"], "GET_DATA");
        assert_eq!(value["vendor"]["detail"]["kind"], "ack");
        assert_eq!(value["elapsed"]["secs"], 1);
    }
}
