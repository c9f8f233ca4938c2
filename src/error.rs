//! Analyzer error types

use scarlett_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while reading a capture or decoding one of its records
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Not a capture this tool understands; fatal for the session
    #[error("capture format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record is shorter than the USB front structures it must carry
    #[error("truncated header: need {needed} bytes, have {available}")]
    TruncatedHeader { needed: usize, available: usize },

    /// The capture ends in the middle of a record
    #[error("capture truncated after {records} records, dropping partial record")]
    TruncatedCapture { records: u64 },

    /// A record does not fit the reader's buffer
    #[error("record {index} is larger than the {capacity}-byte read buffer")]
    RecordTooLarge { index: u64, capacity: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("config error: {0}")]
    Config(String),
}

impl AnalyzerError {
    /// Whether this error ends the whole decode session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalyzerError::Format(_) | AnalyzerError::Io(_) | AnalyzerError::Config(_)
        )
    }
}
