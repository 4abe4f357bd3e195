use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use reno_sim_simulator::SimulationReport;
use reno_sim_simulator::topology::SINK_NODE;
use serde::Serialize;

/// Data segments offered by the sender against those that reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacketSummary {
    pub sent: u64,
    pub received: u64,
    /// Frames dropped anywhere, by full queues or link loss.
    pub lost: u64,
    /// `received / sent` in percent; absent when nothing was sent.
    pub efficiency_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub timeouts: u64,
    pub fast_retransmits: u64,
    pub duplicate_acks: u64,
    pub retransmissions: u64,
}

/// Read the JSON report written by `reno-sim --trace-out`.
pub fn load_run_report(path: &Path) -> Result<SimulationReport> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open run report {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse run report {}", path.display()))
}

pub fn packet_summary(report: &SimulationReport) -> PacketSummary {
    let sent = report.sender.segments_sent;
    let received = report
        .devices
        .iter()
        .filter(|d| d.node == SINK_NODE)
        .map(|d| d.stats.rx_packets)
        .sum();
    PacketSummary {
        sent,
        received,
        lost: report.queue_drops() + report.loss_drops(),
        efficiency_pct: (sent > 0).then(|| received as f64 / sent as f64 * 100.0),
    }
}

pub fn event_summary(report: &SimulationReport) -> EventSummary {
    let sender = &report.sender;
    EventSummary {
        timeouts: sender.timeouts,
        fast_retransmits: sender.fast_retransmits,
        duplicate_acks: sender.duplicate_acks,
        retransmissions: sender.retransmissions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reno_sim_abstract::SimConfig;
    use reno_sim_simulator::Simulator;
    use tempfile::TempDir;

    fn lossy_run() -> SimulationReport {
        let mut config = SimConfig {
            sim_time: 3.0,
            seed: 11,
            ..Default::default()
        };
        config.bottleneck_link.loss_rate = 0.05;
        let mut sim = Simulator::new(config);
        sim.run_until_complete();
        sim.export_report()
    }

    #[test]
    fn report_written_by_a_run_loads_back() {
        let report = lossy_run();
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.json");
        // reno-sim writes the report with its run average alongside.
        let mut value = serde_json::to_value(&report).unwrap();
        value["average_throughput_mbps"] = serde_json::json!(0.5);
        std::fs::write(&path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();

        let loaded = load_run_report(&path).unwrap();
        assert_eq!(loaded.sender, report.sender);
        assert_eq!(loaded.total_rx_bytes, report.total_rx_bytes);
        assert_eq!(loaded.devices.len(), 4);
        assert_eq!(packet_summary(&loaded), packet_summary(&report));
    }

    #[test]
    fn packets_and_events_follow_the_counters() {
        let report = lossy_run();
        let packets = packet_summary(&report);
        assert_eq!(packets.sent, report.sender.segments_sent);
        assert!(packets.lost > 0);
        assert!(packets.received < packets.sent);
        let efficiency = packets.efficiency_pct.unwrap();
        assert!(efficiency > 0.0 && efficiency < 100.0, "{efficiency}");

        let events = event_summary(&report);
        assert_eq!(events.timeouts, report.sender.timeouts);
        assert_eq!(events.fast_retransmits, report.sender.fast_retransmits);
        assert!(events.retransmissions > 0);
    }

    #[test]
    fn idle_run_has_no_efficiency() {
        let mut sim = Simulator::new(SimConfig {
            sim_time: 0.5,
            ..Default::default()
        });
        sim.run_until_complete();
        let packets = packet_summary(&sim.export_report());
        assert_eq!(packets.sent, 0);
        assert_eq!(packets.efficiency_pct, None);
    }

    #[test]
    fn unreadable_report_names_the_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_run_report(&path).unwrap_err();
        assert!(err.to_string().contains("run.json"));
    }
}
