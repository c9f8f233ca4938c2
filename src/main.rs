//! Scarlett USB capture decoder
//!
//! Replays a USBPcap capture, prints one decoded line per transfer and
//! optionally dumps the device memory reconstructed from vendor writes.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use scarlett_sniffer::cli::Cli;
use scarlett_sniffer::config::AnalyzerConfig;
use scarlett_sniffer::pcap_analyzer::{run_pcap_analysis, AnalysisOptions};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            AnalyzerConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?
        }
        None => AnalyzerConfig::default(),
    };
    let config = cli.merge_into(config);

    let options = AnalysisOptions {
        format: cli.format.into(),
        filter: config.packet_filter()?,
        verbose: cli.verbose,
        color: config.color,
        ascii: config.ascii,
        shadow_capacity: config.shadow_capacity,
    };

    run_pcap_analysis(&cli.input, &options, cli.output.as_deref())
        .with_context(|| format!("analyzing {}", cli.input.display()))?;

    Ok(())
}
