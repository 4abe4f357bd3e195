use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown TCP variant '{0}' (expected TcpNewReno or TcpReno)")]
    UnknownVariant(String),
    #[error("simulation time must be positive, got {0}")]
    NonPositiveSimTime(f64),
    #[error("{link} link data rate must be non-zero")]
    ZeroDataRate { link: &'static str },
    #[error("{link} link delay must be finite and non-negative, got {delay_ms} ms")]
    InvalidDelay { link: &'static str, delay_ms: f64 },
    #[error("{link} link queue must hold at least one packet")]
    ZeroQueue { link: &'static str },
    #[error("{link} link loss rate must be within [0, 1), got {rate}")]
    InvalidLossRate { link: &'static str, rate: f64 },
    #[error("segment size must be non-zero")]
    ZeroSegmentSize,
    #[error("segment size {size} exceeds the IPv4 limit of {max} bytes")]
    SegmentTooLarge { size: u32, max: u32 },
    #[error("application start times must be finite and non-negative")]
    InvalidStartTime,
}
