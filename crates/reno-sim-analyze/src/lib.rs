//! Summary statistics over the `.dat` traces written by a traced run.

pub mod parse;
pub mod run;
pub mod stats;

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use reno_sim_simulator::SimulationReport;
use reno_sim_trace::{CWND_TRACE_FILE, RTT_TRACE_FILE, THROUGHPUT_TRACE_FILE};
use serde::Serialize;
use tracing::debug;

pub use parse::{CwndRecord, ParseError, RttRecord, ThroughputRecord};
pub use run::{EventSummary, PacketSummary, event_summary, load_run_report, packet_summary};
pub use stats::{CwndStats, RttStats, ThroughputStats};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub cwnd: Option<CwndStats>,
    pub rtt: Option<RttStats>,
    pub throughput: Option<ThroughputStats>,
    /// Filled in from a run report, when one is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets: Option<PacketSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<EventSummary>,
}

impl AnalysisReport {
    pub fn with_run(mut self, report: &SimulationReport) -> Self {
        self.packets = Some(packet_summary(report));
        self.events = Some(event_summary(report));
        self
    }
}

fn open(dir: &Path, name: &str) -> Result<BufReader<File>> {
    let path = dir.join(name);
    let file =
        File::open(&path).with_context(|| format!("Failed to open trace {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Load the three trace files from `dir` and summarize them.
pub fn analyze_dir(dir: &Path) -> Result<AnalysisReport> {
    let cwnd = parse::parse_cwnd(open(dir, CWND_TRACE_FILE)?, CWND_TRACE_FILE)?;
    let rtt = parse::parse_rtt(open(dir, RTT_TRACE_FILE)?, RTT_TRACE_FILE)?;
    let throughput = parse::parse_throughput(
        open(dir, THROUGHPUT_TRACE_FILE)?,
        THROUGHPUT_TRACE_FILE,
    )?;
    debug!(
        "Loaded {} cwnd, {} rtt and {} throughput records",
        cwnd.len(),
        rtt.len(),
        throughput.len()
    );
    Ok(AnalysisReport {
        cwnd: stats::cwnd_stats(&cwnd),
        rtt: stats::rtt_stats(&rtt),
        throughput: stats::throughput_stats(&throughput),
        packets: None,
        events: None,
    })
}

pub fn print_report(out: &mut impl Write, report: &AnalysisReport) -> std::io::Result<()> {
    match &report.cwnd {
        Some(c) => {
            writeln!(out, "Congestion window ({} changes)", c.samples)?;
            writeln!(out, "  Initial: {} bytes", c.initial)?;
            writeln!(out, "  Min/Max: {} / {} bytes", c.min, c.max)?;
            writeln!(out, "  Mean:    {:.2} bytes", c.mean)?;
            writeln!(out, "  Std dev: {:.2} bytes", c.std_dev)?;
            writeln!(out, "  Reductions: {}", c.reductions)?;
            writeln!(out, "  Stability: {:.1}%", c.stability_pct)?;
        }
        None => writeln!(out, "Congestion window: no samples")?,
    }
    match &report.rtt {
        Some(r) => {
            writeln!(out, "RTT ({} samples)", r.samples)?;
            writeln!(
                out,
                "  Min/Mean/Max: {} / {:.2} / {} ms",
                r.min_ms, r.mean_ms, r.max_ms
            )?;
        }
        None => writeln!(out, "RTT: no samples")?,
    }
    match &report.throughput {
        Some(t) => {
            writeln!(out, "Throughput ({} samples)", t.samples)?;
            writeln!(out, "  Mean: {:.3} Mbps", t.mean_mbps)?;
            writeln!(out, "  Peak: {:.3} Mbps at {}s", t.peak_mbps, t.peak_time)?;
        }
        None => writeln!(out, "Throughput: no samples")?,
    }
    if let Some(p) = &report.packets {
        writeln!(out, "Packets")?;
        writeln!(out, "  Sent:     {}", p.sent)?;
        writeln!(out, "  Received: {}", p.received)?;
        writeln!(out, "  Lost:     {}", p.lost)?;
        if let Some(efficiency) = p.efficiency_pct {
            writeln!(out, "  Efficiency: {efficiency:.1}%")?;
        }
    }
    if let Some(e) = &report.events {
        writeln!(out, "TCP events")?;
        writeln!(out, "  Timeouts:         {}", e.timeouts)?;
        writeln!(out, "  Fast retransmits: {}", e.fast_retransmits)?;
        writeln!(out, "  Duplicate ACKs:   {}", e.duplicate_acks)?;
        writeln!(out, "  Retransmissions:  {}", e.retransmissions)?;
    }
    Ok(())
}
