use reno_sim_abstract::TcpVariant;

/// Window state shared between the sender and its congestion control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Congestion window, in bytes.
    pub cwnd: u32,
    /// Slow-start threshold, in bytes.
    pub ssthresh: u32,
    pub segment_size: u32,
}

impl Window {
    pub fn new(segment_size: u32, initial_segments: u32) -> Self {
        Self {
            cwnd: segment_size.saturating_mul(initial_segments.max(1)),
            ssthresh: u32::MAX,
            segment_size,
        }
    }

    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }
}

/// Pluggable window-growth and loss-response policy of the bulk sender.
pub trait CongestionControl {
    fn name(&self) -> &'static str;

    /// Grow the window after `segments_acked` segments were newly acknowledged.
    fn increase_window(&mut self, window: &mut Window, segments_acked: u32);

    /// Slow-start threshold to use after a loss while `bytes_in_flight` are outstanding.
    fn ssthresh(&self, window: &Window, bytes_in_flight: u64) -> u32;

    /// Whether fast recovery survives partial acknowledgments.
    fn holds_recovery_on_partial_ack(&self) -> bool;
}

fn slow_start(window: &mut Window, segments_acked: u32) -> u32 {
    if segments_acked == 0 {
        return 0;
    }
    window.cwnd = window.cwnd.saturating_add(window.segment_size);
    segments_acked - 1
}

fn congestion_avoidance(window: &mut Window) {
    let seg = window.segment_size as f64;
    let adder = (seg * seg / window.cwnd.max(1) as f64).max(1.0);
    window.cwnd = window.cwnd.saturating_add(adder as u32);
}

fn halve_flight(window: &Window, bytes_in_flight: u64) -> u32 {
    let floor = 2 * window.segment_size as u64;
    (bytes_in_flight / 2).max(floor).min(u32::MAX as u64) as u32
}

#[derive(Debug, Default)]
pub struct NewReno;

impl CongestionControl for NewReno {
    fn name(&self) -> &'static str {
        "TcpNewReno"
    }

    fn increase_window(&mut self, window: &mut Window, mut segments_acked: u32) {
        if window.in_slow_start() {
            segments_acked = slow_start(window, segments_acked);
        }
        if !window.in_slow_start() && segments_acked > 0 {
            congestion_avoidance(window);
        }
    }

    fn ssthresh(&self, window: &Window, bytes_in_flight: u64) -> u32 {
        halve_flight(window, bytes_in_flight)
    }

    fn holds_recovery_on_partial_ack(&self) -> bool {
        true
    }
}

/// Classic Reno: same growth as NewReno, but any new ACK ends fast recovery.
#[derive(Debug, Default)]
pub struct Reno {
    growth: NewReno,
}

impl CongestionControl for Reno {
    fn name(&self) -> &'static str {
        "TcpReno"
    }

    fn increase_window(&mut self, window: &mut Window, segments_acked: u32) {
        self.growth.increase_window(window, segments_acked);
    }

    fn ssthresh(&self, window: &Window, bytes_in_flight: u64) -> u32 {
        halve_flight(window, bytes_in_flight)
    }

    fn holds_recovery_on_partial_ack(&self) -> bool {
        false
    }
}

pub fn congestion_control_for(variant: TcpVariant) -> Box<dyn CongestionControl> {
    match variant {
        TcpVariant::TcpNewReno => Box::new(NewReno),
        TcpVariant::TcpReno => Box::new(Reno::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_start_adds_one_segment_per_ack() {
        let mut window = Window::new(536, 1);
        let mut cc = NewReno;
        cc.increase_window(&mut window, 1);
        assert_eq!(window.cwnd, 1072);
        cc.increase_window(&mut window, 1);
        assert_eq!(window.cwnd, 1608);
    }

    #[test]
    fn congestion_avoidance_grows_by_a_fraction_of_a_segment() {
        let mut window = Window::new(500, 10);
        window.ssthresh = 5000;
        let mut cc = NewReno;
        cc.increase_window(&mut window, 1);
        // 500 * 500 / 5000 = 50
        assert_eq!(window.cwnd, 5050);
    }

    #[test]
    fn ssthresh_never_drops_below_two_segments() {
        let window = Window::new(536, 10);
        assert_eq!(NewReno.ssthresh(&window, 100), 1072);
        assert_eq!(Reno::default().ssthresh(&window, 10_720), 5360);
    }

    #[test]
    fn variants_map_to_their_policies() {
        let newreno = congestion_control_for(TcpVariant::TcpNewReno);
        let reno = congestion_control_for(TcpVariant::TcpReno);
        assert_eq!(newreno.name(), "TcpNewReno");
        assert!(newreno.holds_recovery_on_partial_ack());
        assert_eq!(reno.name(), "TcpReno");
        assert!(!reno.holds_recovery_on_partial_ack());
    }
}
