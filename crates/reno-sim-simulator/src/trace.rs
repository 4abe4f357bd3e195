use reno_sim_abstract::SimConfig;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::tcp::SenderStats;
use crate::topology::DeviceStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub node: u32,
    pub index: u32,
    pub address: Ipv4Addr,
    #[serde(flatten)]
    pub stats: DeviceStats,
}

/// Serializable snapshot of a run's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    /// Simulated time of the last processed event.
    pub duration_secs: f64,
    pub events_processed: u64,
    pub total_rx_bytes: u64,
    pub congestion_control: String,
    pub sender: SenderStats,
    pub final_cwnd: u32,
    pub final_ssthresh: u32,
    pub devices: Vec<DeviceReport>,
}

impl SimulationReport {
    pub fn queue_drops(&self) -> u64 {
        self.devices.iter().map(|d| d.stats.queue_drops).sum()
    }

    pub fn loss_drops(&self) -> u64 {
        self.devices.iter().map(|d| d.stats.loss_drops).sum()
    }
}
