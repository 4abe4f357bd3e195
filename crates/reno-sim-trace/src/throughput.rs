use reno_sim_abstract::SimTime;

/// Minimum spacing between two throughput samples.
pub const DEFAULT_WINDOW: SimTime = SimTime::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// End of the window the sample covers.
    pub time: SimTime,
    pub mbps: f64,
}

/// Rate in megabits per second of `bytes` delivered over `elapsed`.
pub fn megabits_per_second(bytes: u64, elapsed: SimTime) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    // bits * 1e9 / nanos / 1e6
    (bytes as f64 * 8.0) * 1_000.0 / elapsed.as_nanos() as f64
}

/// Whole-run average: total bytes × 8 / configured seconds / 1e6.
pub fn average_throughput_mbps(total_bytes: u64, sim_time_secs: f64) -> f64 {
    if !sim_time_secs.is_finite() || sim_time_secs <= 0.0 {
        return 0.0;
    }
    total_bytes as f64 * 8.0 / sim_time_secs / 1_000_000.0
}

/// Accumulates received bytes and turns them into one throughput sample
/// per window.
///
/// The byte counter always equals the bytes recorded since the last emitted
/// sample (or since time zero before the first one).
#[derive(Debug, Clone)]
pub struct ThroughputAggregator {
    window: SimTime,
    bytes: u64,
    last_emission: SimTime,
}

impl Default for ThroughputAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ThroughputAggregator {
    pub fn new(window: SimTime) -> Self {
        Self {
            window,
            bytes: 0,
            last_emission: SimTime::ZERO,
        }
    }

    /// Count `bytes` received at `now` and emit a sample if at least one
    /// window has passed since the previous one.
    pub fn record(&mut self, now: SimTime, bytes: u32) -> Option<ThroughputSample> {
        self.bytes += bytes as u64;

        let elapsed = now.saturating_sub(self.last_emission);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }

        let sample = ThroughputSample {
            time: now,
            mbps: megabits_per_second(self.bytes, elapsed),
        };
        self.bytes = 0;
        self.last_emission = now;
        Some(sample)
    }

    pub fn pending_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn last_emission(&self) -> SimTime {
        self.last_emission
    }

    pub fn window(&self) -> SimTime {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn secs(s: f64) -> SimTime {
        SimTime::from_secs_f64(s)
    }

    #[test]
    fn emits_once_the_window_has_passed() {
        let mut agg = ThroughputAggregator::default();
        assert_eq!(agg.record(secs(0.0), 12_500), None);
        assert_eq!(agg.record(secs(0.05), 12_500), None);

        let sample = agg.record(secs(0.10), 0).expect("sample at 100ms");
        assert_eq!(sample.time, secs(0.10));
        assert!((sample.mbps - 2.0).abs() < 1e-12, "{}", sample.mbps);
        assert_eq!(agg.pending_bytes(), 0);
        assert_eq!(agg.last_emission(), secs(0.10));
    }

    #[test]
    fn zero_elapsed_time_never_divides() {
        let mut agg = ThroughputAggregator::new(SimTime::ZERO);
        assert_eq!(agg.record(SimTime::ZERO, 1_000), None);
        assert_eq!(agg.pending_bytes(), 1_000);

        let sample = agg.record(secs(0.5), 0).unwrap();
        assert_eq!(agg.record(secs(0.5), 500), None);
        assert!(sample.mbps.is_finite());
        assert_eq!(agg.pending_bytes(), 500);
    }

    #[test]
    fn counter_resets_only_on_emission() {
        let mut agg = ThroughputAggregator::default();
        agg.record(secs(0.02), 100);
        agg.record(secs(0.04), 200);
        assert_eq!(agg.pending_bytes(), 300);
        agg.record(secs(0.13), 50);
        assert_eq!(agg.pending_bytes(), 0);
        agg.record(secs(0.15), 70);
        assert_eq!(agg.pending_bytes(), 70);
    }

    #[test]
    fn random_arrivals_respect_window_and_formula() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut agg = ThroughputAggregator::default();
        let mut now = SimTime::ZERO;
        let mut since_last: u64 = 0;
        let mut previous = SimTime::ZERO;

        for _ in 0..5_000 {
            now += SimTime::from_micros(rng.random_range(0..30_000));
            let bytes = rng.random_range(0..1_500);
            since_last += bytes as u64;

            if let Some(sample) = agg.record(now, bytes) {
                let elapsed = sample.time - previous;
                assert!(elapsed >= DEFAULT_WINDOW);
                assert!(sample.time >= previous);
                let expected = since_last as f64 * 8.0 / elapsed.as_secs_f64() / 1e6;
                assert!((sample.mbps - expected).abs() < 1e-9 * expected.max(1.0));
                previous = sample.time;
                since_last = 0;
            }
            assert_eq!(agg.pending_bytes(), since_last);
        }
    }

    #[test]
    fn run_average_uses_configured_time() {
        assert_eq!(average_throughput_mbps(2_500_000, 20.0), 1.0);
        assert_eq!(average_throughput_mbps(1_000, 0.0), 0.0);
    }
}
