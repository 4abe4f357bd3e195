pub mod engine;
pub mod pcap;
pub mod tcp;
pub mod topology;
pub mod trace;

pub use engine::{EndpointId, Simulator};
pub use topology::{DeviceStats, Topology};
pub use trace::{DeviceReport, SimulationReport};
