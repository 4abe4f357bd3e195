//! Text traces of a simulation run: congestion window, RTT and windowed
//! throughput, one tab-separated `.dat` file each.

pub mod files;
pub mod recorder;
pub mod throughput;

pub use files::{
    CWND_TRACE_FILE, FileRecorder, RTT_TRACE_FILE, THROUGHPUT_TRACE_FILE, create_trace_files,
    trace_paths,
};
pub use recorder::{CWND_HEADER, LineCounts, RTT_HEADER, THROUGHPUT_HEADER, TraceRecorder};
pub use throughput::{
    DEFAULT_WINDOW, ThroughputAggregator, ThroughputSample, average_throughput_mbps,
    megabits_per_second,
};
