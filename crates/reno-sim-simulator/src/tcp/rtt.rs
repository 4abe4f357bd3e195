use reno_sim_abstract::SimTime;

const CLOCK_GRANULARITY: SimTime = SimTime::from_millis(1);

/// Smoothed RTT and retransmission timeout, RFC 6298 style.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<SimTime>,
    rttvar: SimTime,
    rto: SimTime,
    min_rto: SimTime,
    max_rto: SimTime,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(SimTime::from_secs(1), SimTime::from_secs(1), SimTime::from_secs(60))
    }
}

impl RttEstimator {
    pub fn new(initial_rto: SimTime, min_rto: SimTime, max_rto: SimTime) -> Self {
        Self {
            srtt: None,
            rttvar: SimTime::ZERO,
            rto: initial_rto,
            min_rto,
            max_rto,
        }
    }

    pub fn update(&mut self, sample: SimTime) {
        let (srtt, rttvar) = match self.srtt {
            None => (sample, SimTime(sample.0 / 2)),
            Some(srtt) => {
                let deviation = srtt.0.abs_diff(sample.0);
                let rttvar = SimTime((3 * self.rttvar.0 + deviation) / 4);
                let srtt = SimTime((7 * srtt.0 + sample.0) / 8);
                (srtt, rttvar)
            }
        };
        self.srtt = Some(srtt);
        self.rttvar = rttvar;
        let variance_term = rttvar.saturating_mul(4).max(CLOCK_GRANULARITY);
        self.rto = (srtt + variance_term).clamp(self.min_rto, self.max_rto);
    }

    /// Double the timeout after an expiry.
    pub fn backoff(&mut self) {
        self.rto = self.rto.saturating_mul(2).min(self.max_rto);
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }

    pub fn srtt(&self) -> Option<SimTime> {
        self.srtt
    }
}

#[cfg(test)]
mod tests {
    use super::RttEstimator;
    use reno_sim_abstract::SimTime;

    #[test]
    fn first_sample_seeds_the_estimate() {
        let mut rtt = RttEstimator::new(
            SimTime::from_secs(1),
            SimTime::from_millis(10),
            SimTime::from_secs(60),
        );
        rtt.update(SimTime::from_millis(100));
        assert_eq!(rtt.srtt(), Some(SimTime::from_millis(100)));
        // 100 + 4 * 50
        assert_eq!(rtt.rto(), SimTime::from_millis(300));
    }

    #[test]
    fn rto_is_clamped_to_the_minimum() {
        let mut rtt = RttEstimator::default();
        rtt.update(SimTime::from_millis(30));
        assert_eq!(rtt.rto(), SimTime::from_secs(1));
    }

    #[test]
    fn backoff_doubles_up_to_the_maximum() {
        let mut rtt = RttEstimator::default();
        rtt.backoff();
        assert_eq!(rtt.rto(), SimTime::from_secs(2));
        for _ in 0..10 {
            rtt.backoff();
        }
        assert_eq!(rtt.rto(), SimTime::from_secs(60));
    }
}
