//! Vendor command decoding on top of correlated control transfers
//!
//! A control transfer carries vendor traffic in two cases:
//! - a SETUP with bmRequestType 0x21 / bRequest 0x02 (command submitted by
//!   the host, envelope follows the setup packet)
//! - a COMPLETE answering a SETUP with 0xA1 / 0x03 (response read back by
//!   the host, envelope follows the stage byte)
//!
//! Decoding never aborts the record: whatever was parsed before a failure is
//! kept and the undecoded tail is handed back for the raw dump.

use scarlett_protocol::command::DATA_ACCESS_LEN;
use scarlett_protocol::{
    gain_code_to_db, request, ChangeRange, DataAccess, Envelope, MixUpdate, Opcode,
    ProtocolError,
};
use serde::Serialize;
use tracing::warn;

use super::correlator::PendingRequest;
use super::state::ProtocolState;
use super::usb_urb::{ControlSetup, ControlStage};

/// Which half of a command exchange a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Request,
    Response,
}

impl Side {
    pub fn tag(self) -> &'static str {
        match self {
            Side::Request => "REQ",
            Side::Response => "RSP",
        }
    }
}

/// Decide whether a control stage carries vendor traffic.
///
/// `resolved` is the request the correlator matched to this stage (only ever
/// set for COMPLETE).
pub fn qualify(
    stage: ControlStage,
    setup: Option<&ControlSetup>,
    resolved: Option<PendingRequest>,
) -> Option<Side> {
    match stage {
        ControlStage::Setup => setup
            .filter(|s| {
                s.bm_request_type == request::TYPE_CMD_WRITE && s.b_request == request::CMD_REQ
            })
            .map(|_| Side::Request),
        ControlStage::Complete => resolved
            .filter(|r| r.request_type == request::TYPE_CMD_READ && r.request == request::CMD_RESP)
            .map(|_| Side::Response),
        _ => None,
    }
}

/// One SET_MIX gain with its display value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixGain {
    pub code: u16,
    pub db: f64,
}

/// Opcode-specific part of a vendor report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VendorDetail {
    /// Nothing decoded past the envelope
    Generic,
    /// Bare acknowledgement of a write
    Ack,
    /// Access header decoded, but no data committed
    Access { access: DataAccess },
    /// Data committed to the shadow
    Write {
        access: DataAccess,
        changes: Vec<ChangeRange>,
    },
    /// GET_DATA response
    ReadResult { offset: Option<u32>, delivered: u16 },
    /// SET_MIX request
    Mix { channel: u16, gains: Vec<MixGain> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorReport {
    pub side: Side,
    pub envelope: Option<Envelope>,
    pub detail: VendorDetail,
}

/// Result of decoding one vendor record
#[derive(Debug)]
pub struct VendorDecode<'a> {
    pub report: VendorReport,
    pub error: Option<ProtocolError>,
    /// Bytes not consumed by the decoder
    pub rest: &'a [u8],
}

struct Step<'a> {
    detail: VendorDetail,
    error: Option<ProtocolError>,
    rest: &'a [u8],
}

impl<'a> Step<'a> {
    fn done(detail: VendorDetail, rest: &'a [u8]) -> Self {
        Self {
            detail,
            error: None,
            rest,
        }
    }

    fn failed(detail: VendorDetail, error: ProtocolError, rest: &'a [u8]) -> Self {
        Self {
            detail,
            error: Some(error),
            rest,
        }
    }
}

/// Decode the vendor envelope and payload in `data`, updating `state`.
pub fn decode_vendor<'a>(state: &mut ProtocolState, side: Side, data: &'a [u8]) -> VendorDecode<'a> {
    let (envelope, rest) = match Envelope::parse(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            return VendorDecode {
                report: VendorReport {
                    side,
                    envelope: None,
                    detail: VendorDetail::Generic,
                },
                error: Some(e),
                rest: data,
            }
        }
    };

    let step = match (envelope.opcode, side) {
        (Opcode::SetData | Opcode::GetData, Side::Request) => decode_access(state, &envelope, rest),
        (Opcode::SetData, Side::Response) => Step::done(VendorDetail::Ack, rest),
        (Opcode::GetData, Side::Response) => decode_read_result(state, &envelope, rest),
        (Opcode::SetMix, Side::Request) => decode_mix(&envelope, rest),
        (Opcode::SetMix, Side::Response) => Step::done(VendorDetail::Ack, rest),
        (
            Opcode::Init1
            | Opcode::Init2
            | Opcode::SaveConfig
            | Opcode::GetMeters
            | Opcode::SetMux
            | Opcode::DataCmd
            | Opcode::Unknown(_),
            _,
        ) => Step::done(VendorDetail::Generic, rest),
    };

    VendorDecode {
        report: VendorReport {
            side,
            envelope: Some(envelope),
            detail: step.detail,
        },
        error: step.error,
        rest: step.rest,
    }
}

/// SET_DATA / GET_DATA request: both commit their bytes to the shadow.
fn decode_access<'a>(state: &mut ProtocolState, envelope: &Envelope, rest: &'a [u8]) -> Step<'a> {
    let payload = match envelope.payload(rest) {
        Ok(p) => p,
        Err(e) => return Step::failed(VendorDetail::Generic, e, rest),
    };
    let (access, data) = match DataAccess::parse(payload) {
        Ok(parsed) => parsed,
        Err(e) => return Step::failed(VendorDetail::Generic, e, rest),
    };
    let after_header = &rest[DATA_ACCESS_LEN..];

    let bytes = if envelope.opcode == Opcode::GetData {
        state.pending_read_offset = Some(access.offset);
        access.embedded(data)
    } else {
        match access.data(data) {
            Ok(bytes) => bytes,
            Err(e) => return Step::failed(VendorDetail::Access { access }, e, after_header),
        }
    };

    match state.memory.commit(access.offset as usize, bytes) {
        Ok(changes) => Step::done(
            VendorDetail::Write { access, changes },
            &after_header[bytes.len()..],
        ),
        Err(e) => {
            warn!("{} commit skipped: {}", envelope.opcode, e);
            Step::failed(VendorDetail::Access { access }, e, after_header)
        }
    }
}

/// GET_DATA response: pairs the delivered bytes with the requested offset.
fn decode_read_result<'a>(
    state: &mut ProtocolState,
    envelope: &Envelope,
    rest: &'a [u8],
) -> Step<'a> {
    let detail = VendorDetail::ReadResult {
        offset: state.pending_read_offset.take(),
        delivered: envelope.size,
    };
    match envelope.payload(rest) {
        Ok(_) => Step::done(detail, rest),
        Err(e) => Step::failed(detail, e, rest),
    }
}

fn decode_mix<'a>(envelope: &Envelope, rest: &'a [u8]) -> Step<'a> {
    let payload = match envelope.payload(rest) {
        Ok(p) => p,
        Err(e) => return Step::failed(VendorDetail::Generic, e, rest),
    };
    match MixUpdate::parse(payload) {
        // an odd trailing byte stays in the raw dump
        Ok((mix, tail)) => Step::done(
            VendorDetail::Mix {
                channel: mix.channel,
                gains: mix
                    .gains
                    .iter()
                    .map(|&code| MixGain {
                        code,
                        db: gain_code_to_db(code),
                    })
                    .collect(),
            },
            &rest[payload.len() - tail.len()..],
        ),
        Err(e) => Step::failed(VendorDetail::Generic, e, rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scarlett_protocol::{build_packet, MixUpdate};

    fn setup(request_type: u8, request: u8) -> ControlSetup {
        ControlSetup {
            bm_request_type: request_type,
            b_request: request,
            w_value: 0,
            w_index: 3,
            w_length: 0,
        }
    }

    fn set_data(op: Opcode, offset: u32, data: &[u8]) -> Vec<u8> {
        let access = DataAccess {
            offset,
            bytes: data.len() as u32,
        };
        build_packet(op, 1, &access.encode(data))
    }

    #[test]
    fn test_qualify() {
        let write = setup(0x21, 0x02);
        assert_eq!(
            qualify(ControlStage::Setup, Some(&write), None),
            Some(Side::Request)
        );
        assert_eq!(qualify(ControlStage::Setup, Some(&setup(0x21, 0x03)), None), None);
        assert_eq!(qualify(ControlStage::Setup, Some(&setup(0xa1, 0x03)), None), None);

        let read = PendingRequest::new(0xa1, 0x03);
        assert_eq!(
            qualify(ControlStage::Complete, None, Some(read)),
            Some(Side::Response)
        );
        assert_eq!(
            qualify(ControlStage::Complete, None, Some(PendingRequest::new(0x21, 0x02))),
            None
        );
        assert_eq!(qualify(ControlStage::Complete, None, None), None);
        assert_eq!(qualify(ControlStage::Data, Some(&write), None), None);
    }

    #[test]
    fn test_set_data_commits() {
        let mut state = ProtocolState::with_capacity(0x100);
        let mut packet = set_data(Opcode::SetData, 0x10, &[0xaa, 0xbb]);
        packet.push(0xee); // trailing byte past the declared payload

        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        assert!(decoded.error.is_none());
        assert_eq!(decoded.rest, &[0xee]);
        assert_eq!(
            decoded.report.detail,
            VendorDetail::Write {
                access: DataAccess {
                    offset: 0x10,
                    bytes: 2
                },
                changes: vec![ChangeRange {
                    offset: 0x10,
                    old: vec![0, 0],
                    new: vec![0xaa, 0xbb],
                }],
            }
        );
        assert_eq!(state.memory.high_water_mark(), 0x12);
        assert_eq!(state.pending_read_offset, None);
    }

    #[test]
    fn test_set_data_short_payload_keeps_prefix() {
        let mut state = ProtocolState::with_capacity(0x100);
        let access = DataAccess {
            offset: 0x20,
            bytes: 4,
        };
        // declared payload is consistent, but carries only 2 of 4 bytes
        let packet = build_packet(Opcode::SetData, 1, &access.encode(&[1, 2]));

        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        assert_eq!(decoded.report.detail, VendorDetail::Access { access });
        assert!(matches!(
            decoded.error,
            Some(ProtocolError::PayloadTooShort {
                needed: 4,
                available: 2,
                ..
            })
        ));
        assert_eq!(decoded.rest, &[1, 2]);
        assert_eq!(state.memory.high_water_mark(), 0);
    }

    #[test]
    fn test_declared_size_beyond_record() {
        let mut state = ProtocolState::with_capacity(0x100);
        let mut packet = set_data(Opcode::SetData, 0x10, &[0xaa, 0xbb]);
        packet.truncate(packet.len() - 1);

        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        assert!(decoded.report.envelope.is_some());
        assert_eq!(decoded.report.detail, VendorDetail::Generic);
        assert!(matches!(
            decoded.error,
            Some(ProtocolError::PayloadTooShort { needed: 10, available: 9, .. })
        ));
        assert_eq!(decoded.rest.len(), 9);
    }

    #[test]
    fn test_out_of_range_commit_is_skipped() {
        let mut state = ProtocolState::with_capacity(0x10);
        let packet = set_data(Opcode::SetData, 0x0f, &[1, 2]);

        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        assert!(matches!(
            decoded.error,
            Some(ProtocolError::OutOfRange {
                offset: 0x0f,
                len: 2,
                capacity: 0x10
            })
        ));
        assert!(matches!(decoded.report.detail, VendorDetail::Access { .. }));
        assert_eq!(decoded.rest, &[1, 2]);
        assert_eq!(state.memory.high_water_mark(), 0);
    }

    #[test]
    fn test_get_data_request_and_response() {
        let mut state = ProtocolState::with_capacity(0x100);

        // a plain read request carries no data
        let access = DataAccess {
            offset: 0x40,
            bytes: 4,
        };
        let request = build_packet(Opcode::GetData, 2, &access.encode(&[]));
        let decoded = decode_vendor(&mut state, Side::Request, &request);
        assert!(decoded.error.is_none());
        assert_eq!(
            decoded.report.detail,
            VendorDetail::Write {
                access,
                changes: vec![]
            }
        );
        assert_eq!(state.pending_read_offset, Some(0x40));

        let response = build_packet(Opcode::GetData, 2, &[9, 8, 7, 6]);
        let decoded = decode_vendor(&mut state, Side::Response, &response);
        assert!(decoded.error.is_none());
        assert_eq!(
            decoded.report.detail,
            VendorDetail::ReadResult {
                offset: Some(0x40),
                delivered: 4
            }
        );
        assert_eq!(decoded.rest, &[9, 8, 7, 6]);
        assert_eq!(state.pending_read_offset, None);

        // unmatched response has no offset to report
        let decoded = decode_vendor(&mut state, Side::Response, &response);
        assert_eq!(
            decoded.report.detail,
            VendorDetail::ReadResult {
                offset: None,
                delivered: 4
            }
        );
    }

    #[test]
    fn test_get_data_request_with_embedded_snapshot_commits() {
        let mut state = ProtocolState::with_capacity(0x100);
        let packet = set_data(Opcode::GetData, 0x08, &[0x11, 0x00, 0x22]);

        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        let VendorDetail::Write { changes, .. } = &decoded.report.detail else {
            panic!("expected write, got {:?}", decoded.report.detail);
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(state.memory.read(0x08, 3), Some(&[0x11, 0x00, 0x22][..]));
    }

    #[test]
    fn test_set_mix_gains() {
        let mut state = ProtocolState::with_capacity(0x100);
        let mix = MixUpdate {
            channel: 4,
            gains: vec![8192, 4096, 0],
        };
        let packet = build_packet(Opcode::SetMix, 3, &mix.encode());

        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        assert!(decoded.error.is_none());
        let VendorDetail::Mix { channel, gains } = &decoded.report.detail else {
            panic!("expected mix, got {:?}", decoded.report.detail);
        };
        assert_eq!(*channel, 4);
        assert_eq!(gains.len(), 3);
        assert_eq!(gains[0].db, 0.0);
        assert_eq!(format!("{:.2}", gains[1].db), "-6.02");
        assert!(gains[2].db.is_infinite());

        let ack = build_packet(Opcode::SetMix, 3, &[]);
        let decoded = decode_vendor(&mut state, Side::Response, &ack);
        assert_eq!(decoded.report.detail, VendorDetail::Ack);
    }

    #[test]
    fn test_set_mix_odd_byte_stays_visible() {
        let mut state = ProtocolState::with_capacity(0x100);
        // channel 1, one gain 0x2000, then a lone 0x7f
        let packet = build_packet(Opcode::SetMix, 3, &[0x01, 0x00, 0x00, 0x20, 0x7f]);

        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        assert!(decoded.error.is_none());
        let VendorDetail::Mix { channel, gains } = &decoded.report.detail else {
            panic!("expected mix, got {:?}", decoded.report.detail);
        };
        assert_eq!(*channel, 1);
        assert_eq!(gains.iter().map(|g| g.code).collect::<Vec<_>>(), vec![0x2000]);
        assert_eq!(decoded.rest, &[0x7f]);

        // bytes beyond the declared size follow the odd byte
        let mut padded = packet.clone();
        padded.push(0xee);
        let decoded = decode_vendor(&mut state, Side::Request, &padded);
        assert_eq!(decoded.rest, &[0x7f, 0xee]);
    }

    #[test]
    fn test_other_opcodes_are_generic() {
        let mut state = ProtocolState::with_capacity(0x100);
        let packet = build_packet(Opcode::Unknown(0x4242), 5, &[1, 2, 3]);
        let decoded = decode_vendor(&mut state, Side::Response, &packet);
        assert_eq!(decoded.report.detail, VendorDetail::Generic);
        assert_eq!(
            decoded.report.envelope.map(|e| e.opcode),
            Some(Opcode::Unknown(0x4242))
        );
        assert_eq!(decoded.rest, &[1, 2, 3]);

        let packet = build_packet(Opcode::SaveConfig, 6, &[]);
        let decoded = decode_vendor(&mut state, Side::Request, &packet);
        assert_eq!(decoded.report.detail, VendorDetail::Generic);
    }

    #[test]
    fn test_short_envelope() {
        let mut state = ProtocolState::with_capacity(0x100);
        let decoded = decode_vendor(&mut state, Side::Request, &[1, 2, 3]);
        assert!(decoded.report.envelope.is_none());
        assert!(decoded.error.is_some());
        assert_eq!(decoded.rest, &[1, 2, 3]);
    }
}
