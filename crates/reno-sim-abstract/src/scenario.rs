use crate::config::{LinkConfig, SimConfig};
use crate::variant::TcpVariant;
use serde::Deserialize;

/// Partial configuration loaded from a TOML file. Absent keys keep the
/// value already present in the target `SimConfig`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SimConfigOverride {
    pub max_bytes: Option<u64>,
    pub sim_time: Option<f64>,
    pub tcp_variant: Option<TcpVariant>,
    pub segment_size: Option<u32>,
    pub initial_cwnd: Option<u32>,
    pub sink_start: Option<f64>,
    pub source_start: Option<f64>,
    pub seed: Option<u64>,
    pub access_link: Option<LinkOverride>,
    pub bottleneck_link: Option<LinkOverride>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct LinkOverride {
    pub data_rate_bps: Option<u64>,
    pub delay_ms: Option<f64>,
    pub queue_packets: Option<usize>,
    pub loss_rate: Option<f64>,
}

impl LinkOverride {
    pub fn apply_to(&self, link: &mut LinkConfig) {
        if let Some(v) = self.data_rate_bps {
            link.data_rate_bps = v;
        }
        if let Some(v) = self.delay_ms {
            link.delay_ms = v;
        }
        if let Some(v) = self.queue_packets {
            link.queue_packets = v;
        }
        if let Some(v) = self.loss_rate {
            link.loss_rate = v;
        }
    }
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.max_bytes {
            config.max_bytes = v;
        }
        if let Some(v) = self.sim_time {
            config.sim_time = v;
        }
        if let Some(v) = self.tcp_variant {
            config.tcp_variant = v;
        }
        if let Some(v) = self.segment_size {
            config.segment_size = v;
        }
        if let Some(v) = self.initial_cwnd {
            config.initial_cwnd = v;
        }
        if let Some(v) = self.sink_start {
            config.sink_start = v;
        }
        if let Some(v) = self.source_start {
            config.source_start = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(link) = &self.access_link {
            link.apply_to(&mut config.access_link);
        }
        if let Some(link) = &self.bottleneck_link {
            link.apply_to(&mut config.bottleneck_link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SimConfigOverride;
    use crate::config::SimConfig;
    use crate::variant::TcpVariant;

    #[test]
    fn toml_override_only_touches_present_keys() {
        let raw = r#"
            sim_time = 5.0
            tcp_variant = "TcpReno"

            [bottleneck_link]
            queue_packets = 20
            loss_rate = 0.01
        "#;
        let overrides: SimConfigOverride = toml::from_str(raw).unwrap();
        let mut config = SimConfig::default();
        overrides.apply_to(&mut config);

        assert_eq!(config.sim_time, 5.0);
        assert_eq!(config.tcp_variant, TcpVariant::TcpReno);
        assert_eq!(config.bottleneck_link.queue_packets, 20);
        assert_eq!(config.bottleneck_link.loss_rate, 0.01);
        assert_eq!(config.bottleneck_link.data_rate_bps, 1_000_000);
        assert_eq!(config.access_link, SimConfig::default().access_link);
        assert_eq!(config.max_bytes, 0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let raw = "sim_tme = 5.0";
        assert!(toml::from_str::<SimConfigOverride>(raw).is_err());
    }
}
