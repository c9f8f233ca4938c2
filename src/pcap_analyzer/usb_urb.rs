//! USB URB packet parsing for USBPcap captures
//!
//! This module parses the USB Request Block (URB) front header USBPcap puts
//! in every record, plus the transfer-specific structures that follow it:
//! the isochronous descriptor block and the control stage/setup packet.

use std::fmt;

use serde::Serialize;

use crate::error::AnalyzerError;

/// Size of the fixed URB front header
pub const URB_HEADER_LEN: usize = 27;
/// Size of a control setup packet
pub const SETUP_LEN: usize = 8;
/// Size of the isochronous descriptor block (header + first packet)
pub const ISOCH_HEADER_LEN: usize = 44;

/// Direction of USB transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Host to device (OUT)
    Out,
    /// Device to host (IN)
    In,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Out => "OUT",
            Direction::In => "IN",
        }
    }
}

/// USB transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferType {
    Isochronous,
    Interrupt,
    Control,
    Bulk,
    /// Discriminant outside the 2-bit range, reported raw
    Unknown(u8),
}

impl From<u8> for TransferType {
    fn from(b: u8) -> Self {
        match b {
            0 => Self::Isochronous,
            1 => Self::Interrupt,
            2 => Self::Control,
            3 => Self::Bulk,
            other => Self::Unknown(other),
        }
    }
}

/// USB function codes from USBPcap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UsbFunction {
    /// URB_FUNCTION_SELECT_CONFIGURATION
    SelectConfiguration,
    /// URB_FUNCTION_CONTROL_TRANSFER
    ControlTransfer,
    /// URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER
    BulkOrInterruptTransfer,
    /// URB_FUNCTION_GET_DESCRIPTOR_FROM_DEVICE
    GetDescriptor,
    Unknown(u16),
}

impl From<u16> for UsbFunction {
    fn from(v: u16) -> Self {
        match v {
            0x0000 => Self::SelectConfiguration,
            0x0008 => Self::ControlTransfer,
            0x0009 => Self::BulkOrInterruptTransfer,
            0x000B => Self::GetDescriptor,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for UsbFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectConfiguration => f.write_str("SELECT_CONFIGURATION"),
            Self::ControlTransfer => f.write_str("CONTROL_TRANSFER"),
            Self::BulkOrInterruptTransfer => f.write_str("BULK_OR_INTERRUPT"),
            Self::GetDescriptor => f.write_str("GET_DESCRIPTOR"),
            Self::Unknown(code) => write!(f, "func=0x{:04x}", code),
        }
    }
}

/// Parsed USB URB header
#[derive(Debug, Clone, Serialize)]
pub struct UsbUrb {
    /// Header length in bytes, as declared by USBPcap
    pub header_len: u16,
    /// IRP ID for correlation
    pub irp_id: u64,
    /// USBD status
    pub status: u32,
    pub function: UsbFunction,
    /// Info flags (bit 0 set = completion travelling back to the host)
    pub info: u8,
    pub bus: u16,
    pub device: u16,
    /// Endpoint address: direction in bit 7, number in the low nibble
    pub endpoint: u8,
    pub transfer_type: TransferType,
    /// Declared data length
    pub data_len: u32,
}

impl UsbUrb {
    pub fn direction(&self) -> Direction {
        if self.endpoint & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// Logical endpoint number
    pub fn endpoint_number(&self) -> u8 {
        self.endpoint & 0x0f
    }

    /// Whether this record travels from the device back to the host
    pub fn from_device(&self) -> bool {
        self.info & 0x01 != 0
    }

    /// `host -> 1.5.0 OUT` / `1.5.0 -> host IN`
    pub fn address(&self) -> String {
        let target = format!("{}.{}.{}", self.bus, self.device, self.endpoint_number());
        let dir = self.direction().as_str();
        if self.from_device() {
            format!("{} -> host {}", target, dir)
        } else {
            format!("host -> {} {}", target, dir)
        }
    }
}

/// Stage of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlStage {
    Setup,
    Data,
    Status,
    Complete,
    Other(u8),
}

impl From<u8> for ControlStage {
    fn from(b: u8) -> Self {
        match b {
            0 => Self::Setup,
            1 => Self::Data,
            2 => Self::Status,
            3 => Self::Complete,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ControlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("SETUP"),
            Self::Data => f.write_str("DATA"),
            Self::Status => f.write_str("STATUS"),
            Self::Complete => f.write_str("COMPLETE"),
            Self::Other(stage) => write!(f, "stage=0x{:x}", stage),
        }
    }
}

/// Control transfer setup packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlSetup {
    /// bmRequestType: direction, type, recipient
    pub bm_request_type: u8,
    /// bRequest: specific request code
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

impl ControlSetup {
    /// Check if the data stage flows device-to-host
    pub fn is_device_to_host(&self) -> bool {
        self.bm_request_type & 0x80 != 0
    }

    /// Request type field (bits 5-6): 0 standard, 1 class, 2 vendor, 3 reserved
    pub fn request_kind(&self) -> u8 {
        (self.bm_request_type >> 5) & 0x03
    }

    /// Recipient field (bits 0-4)
    pub fn recipient(&self) -> u8 {
        self.bm_request_type & 0x1f
    }

    /// Name of a standard request, `UNKNOWN(0x..)` for everything else
    pub fn request_name(&self) -> String {
        let name = if self.request_kind() == 0 {
            match (self.recipient(), self.b_request) {
                (0..=2, 0x00) => Some("GET_STATUS"),
                (0..=2, 0x01) => Some("CLEAR_FEATURE"),
                (0..=2, 0x03) => Some("SET_FEATURE"),
                (0, 0x05) => Some("SET_ADDRESS"),
                (0, 0x06) => Some("GET_DESCRIPTOR"),
                (0, 0x07) => Some("SET_DESCRIPTOR"),
                (0, 0x08) => Some("GET_CONFIGURATION"),
                (0, 0x09) => Some("SET_CONFIGURATION"),
                (1, 0x0a) => Some("GET_INTERFACE"),
                (1, 0x11) => Some("SET_INTERFACE"),
                (2, 0x12) => Some("SYNCH_FRAME"),
                _ => None,
            }
        } else {
            None
        };

        match name {
            Some(n) => n.to_string(),
            None => format!("UNKNOWN(0x{:x})", self.b_request),
        }
    }

    /// `0x21[HTD CLASS IFACE] 0x02[UNKNOWN(0x2)]`
    pub fn describe(&self) -> String {
        let phase = if self.is_device_to_host() { "DTH" } else { "HTD" };
        let kind = match self.request_kind() {
            0 => "STANDARD",
            1 => "CLASS",
            2 => "VENDOR",
            _ => "RESERVED",
        };
        let recipient = match self.recipient() {
            0 => "DEVICE",
            1 => "IFACE",
            2 => "ENDPOINT",
            3 => "OTHER",
            _ => "RESERVED",
        };
        format!(
            "0x{:02x}[{} {} {}] 0x{:02x}[{}]",
            self.bm_request_type,
            phase,
            kind,
            recipient,
            self.b_request,
            self.request_name()
        )
    }
}

/// First isochronous sub-packet descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsoPacket {
    pub offset: u64,
    pub length: u64,
    pub status: u32,
}

/// Isochronous descriptor block following the URB header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsochHeader {
    pub start_frame: u64,
    pub packets: u64,
    pub errors: u64,
    pub first: IsoPacket,
}

/// Transfer-kind specific structures decoded after the URB header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransferDetail {
    /// Descriptor block is absent on records too short to carry it
    Isochronous(Option<IsochHeader>),
    Interrupt,
    Control {
        stage: ControlStage,
        /// Present for every stage except COMPLETE
        setup: Option<ControlSetup>,
    },
    Bulk,
    Unknown(u8),
}

impl TransferDetail {
    /// Control stage and setup, if this is a control transfer
    pub fn control(&self) -> Option<(ControlStage, Option<&ControlSetup>)> {
        match self {
            Self::Control { stage, setup } => Some((*stage, setup.as_ref())),
            _ => None,
        }
    }
}

/// A fully classified record: header, kind details and the bytes left over
#[derive(Debug, Clone)]
pub struct UsbPacket<'a> {
    pub urb: UsbUrb,
    pub detail: TransferDetail,
    pub payload: &'a [u8],
}

fn le16(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

fn le32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn le64(raw: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn require(raw: &[u8], needed: usize) -> Result<(), AnalyzerError> {
    if raw.len() < needed {
        return Err(AnalyzerError::TruncatedHeader {
            needed,
            available: raw.len(),
        });
    }
    Ok(())
}

/// Parse the USBPcap URB front header, returning it and the bytes after it
///
/// USBPcap header format (27 bytes):
/// ```text
/// Offset  Size  Field
/// 0       2     headerLen
/// 2       8     irpId
/// 10      4     status
/// 14      2     function
/// 16      1     info (bit 0 = direction: 0=OUT, 1=IN)
/// 17      2     bus
/// 19      2     device
/// 21      1     endpoint
/// 22      1     transferType (0=iso, 1=int, 2=ctrl, 3=bulk)
/// 23      4     dataLength
/// ```
pub fn parse_urb_header(raw: &[u8]) -> Result<(UsbUrb, &[u8]), AnalyzerError> {
    require(raw, URB_HEADER_LEN)?;

    let urb = UsbUrb {
        header_len: le16(raw, 0),
        irp_id: le64(raw, 2),
        status: le32(raw, 10),
        function: le16(raw, 14).into(),
        info: raw[16],
        bus: le16(raw, 17),
        device: le16(raw, 19),
        endpoint: raw[21],
        transfer_type: raw[22].into(),
        data_len: le32(raw, 23),
    };

    Ok((urb, &raw[URB_HEADER_LEN..]))
}

/// Parse control setup packet (8 bytes)
fn parse_control_setup(raw: &[u8]) -> Result<ControlSetup, AnalyzerError> {
    require(raw, SETUP_LEN)?;

    Ok(ControlSetup {
        bm_request_type: raw[0],
        b_request: raw[1],
        w_value: le16(raw, 2),
        w_index: le16(raw, 4),
        w_length: le16(raw, 6),
    })
}

/// Isochronous descriptor block, `None` when the record is too short
fn parse_isoch_header(raw: &[u8]) -> Option<IsochHeader> {
    if raw.len() < ISOCH_HEADER_LEN {
        return None;
    }

    Some(IsochHeader {
        start_frame: le64(raw, 0),
        packets: le64(raw, 8),
        errors: le64(raw, 16),
        first: IsoPacket {
            offset: le64(raw, 24),
            length: le64(raw, 32),
            status: le32(raw, 40),
        },
    })
}

/// Decode the kind-specific structures following the URB header
pub fn parse_transfer_detail<'a>(
    urb: &UsbUrb,
    rest: &'a [u8],
) -> Result<(TransferDetail, &'a [u8]), AnalyzerError> {
    match urb.transfer_type {
        TransferType::Isochronous => match parse_isoch_header(rest) {
            Some(iso) => Ok((
                TransferDetail::Isochronous(Some(iso)),
                &rest[ISOCH_HEADER_LEN..],
            )),
            None => Ok((TransferDetail::Isochronous(None), rest)),
        },
        TransferType::Control => {
            // Stage byte, then the setup packet on every stage but COMPLETE
            require(rest, 1).map_err(|_| AnalyzerError::TruncatedHeader {
                needed: URB_HEADER_LEN + 1,
                available: URB_HEADER_LEN + rest.len(),
            })?;
            let stage = ControlStage::from(rest[0]);
            let rest = &rest[1..];

            if stage == ControlStage::Complete {
                return Ok((TransferDetail::Control { stage, setup: None }, rest));
            }

            let setup = parse_control_setup(rest).map_err(|_| AnalyzerError::TruncatedHeader {
                needed: URB_HEADER_LEN + 1 + SETUP_LEN,
                available: URB_HEADER_LEN + 1 + rest.len(),
            })?;
            Ok((
                TransferDetail::Control {
                    stage,
                    setup: Some(setup),
                },
                &rest[SETUP_LEN..],
            ))
        }
        TransferType::Interrupt => Ok((TransferDetail::Interrupt, rest)),
        TransferType::Bulk => Ok((TransferDetail::Bulk, rest)),
        TransferType::Unknown(t) => Ok((TransferDetail::Unknown(t), rest)),
    }
}

/// Parse a complete USB packet from pcap data
pub fn parse_usb_packet(raw: &[u8]) -> Result<UsbPacket<'_>, AnalyzerError> {
    let (urb, rest) = parse_urb_header(raw)?;
    let (detail, payload) = parse_transfer_detail(&urb, rest)?;
    Ok(UsbPacket {
        urb,
        detail,
        payload,
    })
}

/// Serialize a URB front header (used to build synthetic captures)
#[cfg(test)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn encode_urb_header(
    header_len: u16,
    irp_id: u64,
    status: u32,
    function: u16,
    info: u8,
    bus: u16,
    device: u16,
    endpoint: u8,
    transfer_type: u8,
    data_len: u32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(URB_HEADER_LEN);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&irp_id.to_le_bytes());
    out.extend_from_slice(&status.to_le_bytes());
    out.extend_from_slice(&function.to_le_bytes());
    out.push(info);
    out.extend_from_slice(&bus.to_le_bytes());
    out.extend_from_slice(&device.to_le_bytes());
    out.push(endpoint);
    out.push(transfer_type);
    out.extend_from_slice(&data_len.to_le_bytes());
    out
}
