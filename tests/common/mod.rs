//! Byte-level builders for synthetic USBPcap captures.

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;

pub const LINKTYPE_USBPCAP: u32 = 249;

/// Pcap global header (little-endian, microsecond timestamps)
pub fn encode_header(snaplen: u32, link_type: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    out.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    out.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    out.extend_from_slice(&snaplen.to_le_bytes());
    out.extend_from_slice(&link_type.to_le_bytes());
    out
}

/// One pcap record with caplen == origlen
pub fn encode_record(ts_sec: u32, ts_usec: u32, data: &[u8]) -> Vec<u8> {
    let len = data.len() as u32;
    let mut out = Vec::with_capacity(16 + data.len());
    out.extend_from_slice(&ts_sec.to_le_bytes());
    out.extend_from_slice(&ts_usec.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// URB front header as USBPcap writes it
#[allow(clippy::too_many_arguments)]
pub fn encode_urb_header(
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
    let mut out = Vec::with_capacity(27);
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
