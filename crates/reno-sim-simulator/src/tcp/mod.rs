pub mod congestion;
pub mod rtt;
pub mod sender;
pub mod sink;

pub use congestion::{CongestionControl, NewReno, Reno, Window, congestion_control_for};
pub use rtt::RttEstimator;
pub use sender::{BulkSender, SenderStats};
pub use sink::PacketSink;
