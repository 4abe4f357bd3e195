use crate::error::ConfigError;
use crate::packet::MAX_SEGMENT_SIZE;
use crate::time::SimTime;
use crate::variant::TcpVariant;
use serde::{Deserialize, Serialize};

/// Parameters of one point-to-point link. Both directions share them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub data_rate_bps: u64,
    pub delay_ms: f64,
    /// Drop-tail limit of each device's transmit queue, in packets.
    pub queue_packets: usize,
    /// Probability that a transmitted frame never reaches the far end.
    pub loss_rate: f64,
}

impl LinkConfig {
    pub fn new(data_rate_bps: u64, delay_ms: f64) -> Self {
        Self {
            data_rate_bps,
            delay_ms,
            queue_packets: 100,
            loss_rate: 0.0,
        }
    }

    pub fn delay(&self) -> SimTime {
        SimTime::from_secs_f64(self.delay_ms / 1000.0)
    }

    fn validate(&self, link: &'static str) -> Result<(), ConfigError> {
        if self.data_rate_bps == 0 {
            return Err(ConfigError::ZeroDataRate { link });
        }
        if !self.delay_ms.is_finite() || self.delay_ms < 0.0 {
            return Err(ConfigError::InvalidDelay {
                link,
                delay_ms: self.delay_ms,
            });
        }
        if self.queue_packets == 0 {
            return Err(ConfigError::ZeroQueue { link });
        }
        if !(0.0..1.0).contains(&self.loss_rate) {
            return Err(ConfigError::InvalidLossRate {
                link,
                rate: self.loss_rate,
            });
        }
        Ok(())
    }
}

/// Everything the engine needs to build and run the three-node scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Bytes the bulk sender offers in total; 0 means unlimited.
    pub max_bytes: u64,
    /// Simulated seconds until the run is stopped.
    pub sim_time: f64,
    pub tcp_variant: TcpVariant,
    /// n0 <-> n1.
    pub access_link: LinkConfig,
    /// n1 <-> n2.
    pub bottleneck_link: LinkConfig,
    pub segment_size: u32,
    /// Initial congestion window, in segments.
    pub initial_cwnd: u32,
    pub sink_start: f64,
    pub source_start: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_bytes: 0,
            sim_time: 20.0,
            tcp_variant: TcpVariant::TcpNewReno,
            access_link: LinkConfig::new(10_000_000, 1.0),
            bottleneck_link: LinkConfig::new(1_000_000, 10.0),
            segment_size: 536,
            initial_cwnd: 10,
            sink_start: 0.0,
            source_start: 1.0,
            seed: 0,
        }
    }
}

impl SimConfig {
    pub fn stop_time(&self) -> SimTime {
        SimTime::from_secs_f64(self.sim_time)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sim_time.is_finite() || self.sim_time <= 0.0 {
            return Err(ConfigError::NonPositiveSimTime(self.sim_time));
        }
        self.access_link.validate("access")?;
        self.bottleneck_link.validate("bottleneck")?;
        if self.segment_size == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }
        if self.segment_size > MAX_SEGMENT_SIZE {
            return Err(ConfigError::SegmentTooLarge {
                size: self.segment_size,
                max: MAX_SEGMENT_SIZE,
            });
        }
        for start in [self.sink_start, self.source_start] {
            if !start.is_finite() || start < 0.0 {
                return Err(ConfigError::InvalidStartTime);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SimConfig;
    use crate::error::ConfigError;
    use crate::packet::MAX_SEGMENT_SIZE;
    use crate::time::SimTime;

    #[test]
    fn defaults_describe_the_reference_topology() {
        let config = SimConfig::default();
        assert_eq!(config.access_link.data_rate_bps, 10_000_000);
        assert_eq!(config.access_link.delay(), SimTime::from_millis(1));
        assert_eq!(config.bottleneck_link.data_rate_bps, 1_000_000);
        assert_eq!(config.bottleneck_link.delay(), SimTime::from_millis(10));
        assert_eq!(config.stop_time(), SimTime::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_sim_time() {
        let config = SimConfig {
            sim_time: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveSimTime(0.0)));
    }

    #[test]
    fn rejects_bad_link_parameters() {
        let mut config = SimConfig::default();
        config.bottleneck_link.data_rate_bps = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDataRate { link: "bottleneck" })
        );

        let mut config = SimConfig::default();
        config.access_link.loss_rate = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLossRate { link: "access", .. })
        ));
    }

    #[test]
    fn segment_must_fit_an_ipv4_datagram() {
        let largest = SimConfig {
            segment_size: 65_495,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());

        for size in [65_496, u32::MAX] {
            let config = SimConfig {
                segment_size: size,
                ..Default::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::SegmentTooLarge {
                    size,
                    max: MAX_SEGMENT_SIZE
                })
            );
        }
    }
}
