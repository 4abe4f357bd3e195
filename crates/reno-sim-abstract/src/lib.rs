pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;
pub mod time;
pub mod variant;

pub use interface::{SocketContext, TcpEndpoint, TraceSink};
pub use packet::{MAX_SEGMENT_SIZE, Packet, TcpHeader};
// Re-export flags module from packet so users can write `flags::ACK`
pub use packet::flags;

pub use config::{LinkConfig, SimConfig};
pub use error::ConfigError;
pub use scenario::{LinkOverride, SimConfigOverride};
pub use time::SimTime;
pub use variant::TcpVariant;
