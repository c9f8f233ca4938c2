//! Control transfer correlation
//!
//! USBPcap logs a control transfer as separate records: the SETUP submitted
//! by the host and, later, the COMPLETE coming back. The COMPLETE record does
//! not repeat the setup packet, so the request it answers has to be
//! remembered from the SETUP. The control endpoint is half-duplex: at most
//! one request is outstanding and a new SETUP replaces a stale one.

use serde::Serialize;
use tracing::debug;

use super::usb_urb::{ControlSetup, ControlStage};

/// Request identity latched at SETUP time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub request_type: u8,
    pub request: u8,
}

impl PendingRequest {
    pub fn new(request_type: u8, request: u8) -> Self {
        Self {
            request_type,
            request,
        }
    }
}

impl From<&ControlSetup> for PendingRequest {
    fn from(setup: &ControlSetup) -> Self {
        Self::new(setup.bm_request_type, setup.b_request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorState {
    Idle,
    AwaitingCompletion(PendingRequest),
}

#[derive(Debug, Default)]
pub struct ControlCorrelator {
    pending: Option<PendingRequest>,
}

impl ControlCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CorrelatorState {
        match self.pending {
            Some(req) => CorrelatorState::AwaitingCompletion(req),
            None => CorrelatorState::Idle,
        }
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// Feed one control stage.
    ///
    /// Returns the request resolved by this stage: the latched request when a
    /// COMPLETE arrives while one is pending, otherwise `None`. DATA and
    /// STATUS stages pass through untouched.
    pub fn observe(
        &mut self,
        stage: ControlStage,
        setup: Option<&ControlSetup>,
    ) -> Option<PendingRequest> {
        match stage {
            ControlStage::Setup => {
                if let Some(setup) = setup {
                    let req = PendingRequest::from(setup);
                    if let Some(stale) = self.pending.replace(req) {
                        debug!(
                            "SETUP 0x{:02x}/0x{:02x} supersedes unanswered 0x{:02x}/0x{:02x}",
                            req.request_type, req.request, stale.request_type, stale.request
                        );
                    }
                }
                None
            }
            ControlStage::Complete => self.pending.take(),
            ControlStage::Data | ControlStage::Status | ControlStage::Other(_) => None,
        }
    }
}
