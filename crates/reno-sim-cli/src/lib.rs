use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::BoolishValueParser;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use reno_sim_abstract::{SimConfig, SimConfigOverride, TcpVariant};
use reno_sim_simulator::{SimulationReport, Simulator};
use reno_sim_trace::{average_throughput_mbps, create_trace_files};

#[derive(Parser, Debug)]
#[command(author, version, about = "Three-node TCP bulk-transfer simulation")]
pub struct Args {
    /// Total number of bytes to send (0 = unlimited).
    #[arg(long = "maxBytes")]
    pub max_bytes: Option<u64>,

    /// Simulation time in seconds.
    #[arg(long = "simTime")]
    pub sim_time: Option<f64>,

    /// Congestion control of the bulk sender (TcpNewReno or TcpReno).
    #[arg(long = "tcpVariant")]
    pub tcp_variant: Option<TcpVariant>,

    /// Write cwnd, RTT and throughput traces plus packet captures.
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub tracing: Option<bool>,

    /// TOML file with configuration overrides.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory receiving trace and capture files.
    #[arg(long, default_value = "results")]
    pub output_dir: PathBuf,

    /// File name prefix of the packet captures.
    #[arg(long, default_value = "reno-sim")]
    pub pcap_prefix: String,

    /// Write a JSON report of the finished simulation.
    #[arg(long)]
    pub trace_out: Option<PathBuf>,
}

impl Args {
    /// Defaults, then the TOML file, then explicit flags.
    pub fn resolve(&self) -> Result<RunOptions> {
        let mut config = SimConfig::default();
        if let Some(path) = &self.config {
            load_overrides(path)?.apply_to(&mut config);
        }
        if let Some(v) = self.max_bytes {
            config.max_bytes = v;
        }
        if let Some(v) = self.sim_time {
            config.sim_time = v;
        }
        if let Some(v) = self.tcp_variant {
            config.tcp_variant = v;
        }
        Ok(RunOptions {
            config,
            tracing: self.tracing.unwrap_or(true),
            output_dir: self.output_dir.clone(),
            pcap_prefix: self.pcap_prefix.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: SimConfig,
    pub tracing: bool,
    pub output_dir: PathBuf,
    pub pcap_prefix: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub report: SimulationReport,
    pub average_throughput_mbps: f64,
}

impl RunSummary {
    pub fn total_rx_bytes(&self) -> u64 {
        self.report.total_rx_bytes
    }
}

/// Build the scenario, attach the trace outputs if enabled, run to the stop
/// time and release every output.
pub fn run(options: &RunOptions) -> Result<RunSummary> {
    options.config.validate().context("Invalid simulation configuration")?;

    let mut sim = Simulator::new(options.config.clone());

    if options.tracing {
        let dir = &options.output_dir;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        let recorder = create_trace_files(dir)?;
        sim.set_trace_sink(Box::new(recorder));
        let captures = sim.enable_pcap(dir, &options.pcap_prefix)?;
        info!("Capturing packets to {} files", captures.len());
    }

    info!(
        "Starting simulation: {} for {}s, maxBytes={}",
        options.config.tcp_variant, options.config.sim_time, options.config.max_bytes
    );
    sim.run_until_complete();

    close_outputs(&mut sim)?;

    let report = sim.export_report();
    let average_throughput_mbps =
        average_throughput_mbps(report.total_rx_bytes, options.config.sim_time);
    info!(
        "Run finished after {} events, {} queue drops, {} retransmissions",
        report.events_processed,
        report.queue_drops(),
        report.sender.retransmissions
    );
    Ok(RunSummary {
        report,
        average_throughput_mbps,
    })
}

/// Close the trace streams and the packet captures. Both are always closed;
/// the first failure is returned.
pub fn close_outputs(sim: &mut Simulator) -> Result<()> {
    let traces = sim.close_trace_sink().context("Failed to write trace files");
    let captures = sim
        .close_captures()
        .context("Failed to write packet captures");
    traces.and(captures)
}

pub fn print_summary(out: &mut impl Write, summary: &RunSummary) -> std::io::Result<()> {
    writeln!(out, "Simulation completed successfully!")?;
    writeln!(out, "Total Bytes Received: {}", summary.total_rx_bytes())?;
    writeln!(
        out,
        "Average Throughput: {} Mbps",
        summary.average_throughput_mbps
    )
}

pub fn load_overrides(path: &Path) -> Result<SimConfigOverride> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let overrides: SimConfigOverride =
        toml::from_str(&content).context("Failed to parse config file")?;
    Ok(overrides)
}

pub fn write_report(path: &Path, summary: &RunSummary) -> Result<()> {
    let data =
        serde_json::to_vec_pretty(summary).context("Failed to serialize simulation report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write report file {}", path.display()))?;
    Ok(())
}

pub fn init_logging() {
    tracing_subscriber::fmt::init();
}
