// CLI definitions using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::AnalyzerConfig;
use crate::pcap_analyzer::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "scarlett_sniffer")]
#[command(author, version, about = "Decode Focusrite Scarlett vendor traffic from USBPcap captures")]
pub struct Cli {
    /// Capture file (classic pcap written by USBPcap)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Write the reconstructed device memory image here
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = PcapOutputFormat::Text)]
    pub format: PcapOutputFormat,

    /// Filter output (all, control, vendor, op=NAME, op=0xHEX)
    #[arg(long)]
    pub filter: Option<String>,

    /// Disable coloured output
    #[arg(long)]
    pub no_color: bool,

    /// Disable the printable rendering after raw dumps
    #[arg(long)]
    pub no_ascii: bool,

    /// Print per-kind record statistics at the end
    #[arg(short, long)]
    pub verbose: bool,

    /// Optional TOML config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Apply command line overrides on top of a loaded config
    pub fn merge_into(&self, mut config: AnalyzerConfig) -> AnalyzerConfig {
        if let Some(filter) = &self.filter {
            config.filter = filter.clone();
        }
        if self.no_color {
            config.color = false;
        }
        if self.no_ascii {
            config.ascii = false;
        }
        config
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum PcapOutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output (one object per line)
    Json,
}

impl From<PcapOutputFormat> for OutputFormat {
    fn from(f: PcapOutputFormat) -> Self {
        match f {
            PcapOutputFormat::Text => OutputFormat::Text,
            PcapOutputFormat::Json => OutputFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_and_merge() {
        let cli = Cli::try_parse_from([
            "scarlett_sniffer",
            "capture.pcap",
            "-o",
            "memory.bin",
            "--format",
            "json",
            "--filter",
            "vendor",
            "--no-color",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.input, PathBuf::from("capture.pcap"));
        assert_eq!(cli.output, Some(PathBuf::from("memory.bin")));
        assert_eq!(OutputFormat::from(cli.format), OutputFormat::Json);
        assert!(cli.verbose);
        assert_eq!(cli.log_level, "warn");

        let config = cli.merge_into(AnalyzerConfig {
            ascii: false,
            ..Default::default()
        });
        assert_eq!(config.filter, "vendor");
        assert!(!config.color);
        // file setting survives when the flag is absent
        assert!(!config.ascii);
    }

    #[test]
    fn test_input_required() {
        assert!(Cli::try_parse_from(["scarlett_sniffer"]).is_err());
    }
}
