// Focusrite Scarlett USB capture decoder - Shared Library
// Capture reading, transfer classification and vendor protocol replay

pub mod cli;
pub mod config;
pub mod error;
pub mod pcap_analyzer;

pub use config::AnalyzerConfig;
pub use error::AnalyzerError;
pub use pcap_analyzer::{
    decode_record, run_pcap_analysis, AnalysisOptions, AnalysisSummary, CaptureReader,
    OutputFormat, PacketFilter, PcapAnalyzer, ProtocolState, TransferReport,
};
