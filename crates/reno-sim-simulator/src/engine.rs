use crate::pcap::{CaptureSet, capture_path};
use crate::tcp::{BulkSender, PacketSink};
use crate::topology::{Enqueue, SENDER_NODE, SENDER_PORT, SINK_NODE, SINK_PORT, Topology};
use crate::trace::{DeviceReport, SimulationReport};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reno_sim_abstract::{Packet, SimConfig, SimTime, SocketContext, TcpEndpoint, TcpHeader, TraceSink};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointId {
    Sender,
    Sink,
}

impl EndpointId {
    pub fn node(&self) -> u32 {
        match self {
            EndpointId::Sender => SENDER_NODE,
            EndpointId::Sink => SINK_NODE,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            EndpointId::Sender => SENDER_PORT,
            EndpointId::Sink => SINK_PORT,
        }
    }

    pub fn peer(&self) -> Self {
        match self {
            EndpointId::Sender => EndpointId::Sink,
            EndpointId::Sink => EndpointId::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    /// A device finished serializing its current frame.
    TransmitComplete { device: usize },
    /// A frame reached the far end of a link.
    FrameArrival { device: usize, packet: Packet },
    TimerExpiry {
        endpoint: EndpointId,
        timer_id: u32,
        generation: u64,
    },
    AppStart { endpoint: EndpointId },
    AppStop { endpoint: EndpointId },
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug)]
enum TimerOp {
    Start(SimTime, u32),
    Cancel(u32),
}

/// Actions buffered while an endpoint handles an event
#[derive(Default)]
struct ActionBuffer {
    outgoing_segments: Vec<(TcpHeader, u32)>,
    timer_ops: Vec<TimerOp>,
    logs: Vec<String>,
    delivered: Vec<u32>,
    cwnd_changes: Vec<(u32, u32)>,
    rtt_changes: Vec<(SimTime, SimTime)>,
}

/// Context implementation passed to an endpoint
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: SimTime,
}

impl<'a> SocketContext for ScopedContext<'a> {
    fn send_segment(&mut self, header: TcpHeader, payload_len: u32) {
        self.buffer.outgoing_segments.push((header, payload_len));
    }

    fn start_timer(&mut self, delay: SimTime, timer_id: u32) {
        self.buffer.timer_ops.push(TimerOp::Start(delay, timer_id));
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.buffer.timer_ops.push(TimerOp::Cancel(timer_id));
    }

    fn deliver_data(&mut self, bytes: u32) {
        self.buffer.delivered.push(bytes);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> SimTime {
        self.now
    }

    fn congestion_window_changed(&mut self, old: u32, new: u32) {
        self.buffer.cwnd_changes.push((old, new));
    }

    fn rtt_changed(&mut self, old: SimTime, new: SimTime) {
        self.buffer.rtt_changes.push((old, new));
    }
}

/// Discrete-event host for the three-node bulk-transfer scenario.
pub struct Simulator {
    time: SimTime,
    stop_at: SimTime,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    events_processed: u64,
    next_packet_uid: u64,

    config: SimConfig,
    rng: StdRng,
    topology: Topology,

    pub sender: BulkSender,
    pub sink: PacketSink,

    /// Notification target for cwnd, RTT and receive events; absent when tracing is off.
    trace_sink: Option<Box<dyn TraceSink>>,
    captures: Option<CaptureSet>,

    /// Timer generations to handle cancellation.
    /// Key: (endpoint, timer_id), Value: generation counter
    timer_generations: HashMap<(EndpointId, u32), u64>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let topology = Topology::three_node_chain(&config);
        let sender = BulkSender::new(&config, SENDER_PORT, SINK_PORT);

        let mut sim = Self {
            time: SimTime::ZERO,
            stop_at: config.stop_time(),
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            events_processed: 0,
            next_packet_uid: 0,
            rng,
            topology,
            sender,
            sink: PacketSink::default(),
            trace_sink: None,
            captures: None,
            timer_generations: HashMap::new(),
            config,
        };
        sim.install_applications();
        sim
    }

    fn install_applications(&mut self) {
        let sink_start = SimTime::from_secs_f64(self.config.sink_start);
        let source_start = SimTime::from_secs_f64(self.config.source_start);
        let stop = self.stop_at;
        self.push_event(sink_start, EventType::AppStart {
            endpoint: EndpointId::Sink,
        });
        self.push_event(source_start, EventType::AppStart {
            endpoint: EndpointId::Sender,
        });
        self.push_event(stop, EventType::AppStop {
            endpoint: EndpointId::Sink,
        });
        self.push_event(stop, EventType::AppStop {
            endpoint: EndpointId::Sender,
        });
    }

    /// Expose current simulation config (for reports / diagnostics)
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn current_time(&self) -> SimTime {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn peek_next_event_time(&self) -> Option<SimTime> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn total_rx_bytes(&self) -> u64 {
        self.sink.total_rx()
    }

    /// Register the notification target for cwnd, RTT and receive events.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace_sink = Some(sink);
    }

    pub fn has_trace_sink(&self) -> bool {
        self.trace_sink.is_some()
    }

    /// Detach the trace sink and let it flush and release its outputs.
    pub fn close_trace_sink(&mut self) -> io::Result<()> {
        match self.trace_sink.take() {
            Some(mut sink) => sink.close(),
            None => Ok(()),
        }
    }

    /// Capture every frame each device sends or receives, one pcap file per device.
    pub fn enable_pcap(&mut self, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        let paths: Vec<PathBuf> = self
            .topology
            .devices
            .iter()
            .map(|dev| capture_path(dir, prefix, dev.node, dev.index))
            .collect();
        let captures = CaptureSet::create(&paths)
            .with_context(|| format!("Failed to create packet captures in {}", dir.display()))?;
        self.captures = Some(captures);
        Ok(paths)
    }

    pub fn close_captures(&mut self) -> io::Result<()> {
        match self.captures.take() {
            Some(captures) => captures.close(),
            None => Ok(()),
        }
    }

    fn push_event(&mut self, time: SimTime, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    /// Process the next event. Returns false once the queue is empty or the
    /// next event lies beyond the stop time.
    pub fn step(&mut self) -> bool {
        let Some(next_time) = self.peek_next_event_time() else {
            return false;
        };
        if next_time > self.stop_at {
            debug!(
                "Stop time {} reached, discarding {} pending events",
                self.stop_at,
                self.event_queue.len()
            );
            self.event_queue.clear();
            self.time = self.stop_at;
            return false;
        }
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        self.events_processed += 1;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::TransmitComplete { device } => {
                if let Some(next) = self.topology.devices[device].transmission_complete() {
                    self.start_transmission(device, next);
                }
            }
            EventType::FrameArrival { device, packet } => {
                self.receive_frame(device, packet);
            }
            EventType::TimerExpiry {
                endpoint,
                timer_id,
                generation,
            } => {
                // Check if this timer event is still valid by comparing generations
                let current = self.timer_generations.get(&(endpoint, timer_id)).copied();
                if current != Some(generation) {
                    debug!("Skipping stale timer event for timer_id={}", timer_id);
                    return true;
                }
                self.dispatch(endpoint, |ep, ctx| ep.on_timer(ctx, timer_id));
            }
            EventType::AppStart { endpoint } => {
                info!("[{:?}] application start at {}s", endpoint, self.time);
                self.dispatch(endpoint, |ep, ctx| ep.start(ctx));
            }
            EventType::AppStop { endpoint } => {
                info!("[{:?}] application stop at {}s", endpoint, self.time);
                self.dispatch(endpoint, |ep, ctx| ep.stop(ctx));
            }
        }
        true
    }

    pub fn run_until_complete(&mut self) {
        while self.step() {}
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        let window = self.sender.window();
        SimulationReport {
            config: self.config.clone(),
            duration_secs: self.time.as_secs_f64(),
            events_processed: self.events_processed,
            total_rx_bytes: self.sink.total_rx(),
            congestion_control: self.sender.congestion_control().to_string(),
            sender: *self.sender.stats(),
            final_cwnd: window.cwnd,
            final_ssthresh: window.ssthresh,
            devices: self
                .topology
                .devices
                .iter()
                .map(|dev| DeviceReport {
                    node: dev.node,
                    index: dev.index,
                    address: dev.address,
                    stats: dev.stats,
                })
                .collect(),
        }
    }

    fn dispatch(
        &mut self,
        endpoint: EndpointId,
        handler: impl FnOnce(&mut dyn TcpEndpoint, &mut dyn SocketContext),
    ) {
        let mut buffer = ActionBuffer::default();
        {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            let target: &mut dyn TcpEndpoint = match endpoint {
                EndpointId::Sender => &mut self.sender,
                EndpointId::Sink => &mut self.sink,
            };
            handler(target, &mut ctx);
        }
        self.process_actions(endpoint, buffer);
    }

    fn process_actions(&mut self, endpoint: EndpointId, buffer: ActionBuffer) {
        let now = self.time;
        let node = endpoint.node();

        for log in buffer.logs {
            debug!("[{:?}] {}", endpoint, log);
        }

        if let Some(sink) = self.trace_sink.as_mut() {
            for (old, new) in &buffer.cwnd_changes {
                sink.on_congestion_window_change(now, node, *old, *new);
            }
            for (old, new) in &buffer.rtt_changes {
                sink.on_rtt_change(now, node, *old, *new);
            }
            for bytes in &buffer.delivered {
                sink.on_packet_received(now, *bytes);
            }
        }

        for op in buffer.timer_ops {
            match op {
                TimerOp::Cancel(timer_id) => {
                    // Bumping the generation invalidates the pending expiry
                    *self
                        .timer_generations
                        .entry((endpoint, timer_id))
                        .or_insert(0) += 1;
                }
                TimerOp::Start(delay, timer_id) => {
                    let generation = {
                        let slot = self
                            .timer_generations
                            .entry((endpoint, timer_id))
                            .or_insert(0);
                        *slot += 1;
                        *slot
                    };
                    self.push_event(now + delay, EventType::TimerExpiry {
                        endpoint,
                        timer_id,
                        generation,
                    });
                }
            }
        }

        for (header, payload_len) in buffer.outgoing_segments {
            let src = self.topology.address_of(node);
            let dst = self.topology.address_of(endpoint.peer().node());
            let (Some(src), Some(dst)) = (src, dst) else {
                warn!("[{:?}] endpoint has no address, dropping segment", endpoint);
                continue;
            };
            let uid = self.next_packet_uid;
            self.next_packet_uid += 1;
            self.send_from_node(node, Packet::new(uid, src, dst, header, payload_len));
        }
    }

    fn send_from_node(&mut self, node: u32, packet: Packet) {
        let Some(device) = self.topology.route(node, packet.dst) else {
            warn!("node {} has no route to {}, dropping packet", node, packet.dst);
            return;
        };
        match self.topology.devices[device].enqueue(packet) {
            Enqueue::Transmit(packet) => self.start_transmission(device, packet),
            Enqueue::Queued => {}
            Enqueue::Dropped => {
                debug!("node {} device {} queue full, packet dropped", node, device);
            }
        }
    }

    fn start_transmission(&mut self, device: usize, packet: Packet) {
        let now = self.time;
        if let Some(captures) = self.captures.as_mut() {
            captures.record(device, now, &packet);
        }

        let (tx_time, arrival, peer, lost) = {
            let dev = &mut self.topology.devices[device];
            let wire_len = packet.wire_len();
            dev.stats.tx_packets += 1;
            dev.stats.tx_bytes += wire_len as u64;
            let tx_time = dev.tx_time(wire_len);
            let lost = dev.loss_rate > 0.0 && self.rng.random::<f64>() < dev.loss_rate;
            if lost {
                dev.stats.loss_drops += 1;
            }
            (tx_time, now + tx_time + dev.delay, dev.peer, lost)
        };

        self.push_event(now + tx_time, EventType::TransmitComplete { device });
        if lost {
            debug!("frame uid={} lost on device {}", packet.uid, device);
        } else {
            self.push_event(arrival, EventType::FrameArrival {
                device: peer,
                packet,
            });
        }
    }

    fn receive_frame(&mut self, device: usize, mut packet: Packet) {
        let now = self.time;
        if let Some(captures) = self.captures.as_mut() {
            captures.record(device, now, &packet);
        }
        let node = {
            let dev = &mut self.topology.devices[device];
            dev.stats.rx_packets += 1;
            dev.node
        };

        if self.topology.owns_address(node, packet.dst) {
            self.deliver_local(node, packet);
            return;
        }

        packet.ttl = packet.ttl.saturating_sub(1);
        if packet.ttl == 0 {
            debug!("node {} dropping uid={} with expired ttl", node, packet.uid);
            return;
        }
        self.send_from_node(node, packet);
    }

    fn deliver_local(&mut self, node: u32, packet: Packet) {
        let endpoint = match node {
            SENDER_NODE => EndpointId::Sender,
            SINK_NODE => EndpointId::Sink,
            _ => return,
        };
        if packet.header.dst_port != endpoint.port() {
            debug!(
                "node {} has nothing listening on port {}",
                node, packet.header.dst_port
            );
            return;
        }
        let payload_len = packet.payload_len;
        let header = packet.header;
        self.dispatch(endpoint, |ep, ctx| ep.on_segment(ctx, &header, payload_len));
    }
}

#[cfg(test)]
mod tests {
    use super::Simulator;
    use reno_sim_abstract::{SimConfig, SimTime, TcpVariant, TraceSink};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Notice {
        Cwnd(SimTime, u32, u32, u32),
        Rtt(SimTime, u32, SimTime, SimTime),
        Rx(SimTime, u32),
    }

    impl Notice {
        fn time(&self) -> SimTime {
            match self {
                Notice::Cwnd(t, ..) | Notice::Rtt(t, ..) | Notice::Rx(t, _) => *t,
            }
        }
    }

    #[derive(Clone, Default)]
    struct SharedLog(Rc<RefCell<Vec<Notice>>>);

    impl TraceSink for SharedLog {
        fn on_congestion_window_change(&mut self, now: SimTime, node: u32, old: u32, new: u32) {
            self.0.borrow_mut().push(Notice::Cwnd(now, node, old, new));
        }

        fn on_rtt_change(&mut self, now: SimTime, node: u32, old: SimTime, new: SimTime) {
            self.0.borrow_mut().push(Notice::Rtt(now, node, old, new));
        }

        fn on_packet_received(&mut self, now: SimTime, bytes: u32) {
            self.0.borrow_mut().push(Notice::Rx(now, bytes));
        }
    }

    fn short_config() -> SimConfig {
        SimConfig {
            sim_time: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn bulk_transfer_saturates_the_bottleneck() {
        let mut sim = Simulator::new(short_config());
        sim.run_until_complete();

        let report = sim.export_report();
        // Two seconds of sending over 1 Mbps cannot exceed 250 kB.
        assert!(report.total_rx_bytes > 100_000, "{}", report.total_rx_bytes);
        assert!(report.total_rx_bytes < 250_000, "{}", report.total_rx_bytes);
        assert!(sim.current_time() <= SimTime::from_secs(3));
        assert_eq!(report.congestion_control, "TcpNewReno");
        assert_eq!(report.devices.len(), 4);
    }

    #[test]
    fn notifications_arrive_in_time_order() {
        let log = SharedLog::default();
        let mut sim = Simulator::new(short_config());
        sim.set_trace_sink(Box::new(log.clone()));
        sim.run_until_complete();
        sim.close_trace_sink().unwrap();

        let notices = log.0.borrow();
        assert_eq!(
            notices.first(),
            Some(&Notice::Cwnd(SimTime::from_secs(1), 0, 0, 5360))
        );
        assert!(notices.windows(2).all(|w| w[0].time() <= w[1].time()));

        let received: u64 = notices
            .iter()
            .filter_map(|n| match n {
                Notice::Rx(_, bytes) => Some(*bytes as u64),
                _ => None,
            })
            .sum();
        assert_eq!(received, sim.total_rx_bytes());

        let first_rtt = notices.iter().find_map(|n| match n {
            Notice::Rtt(_, node, old, new) => Some((*node, *old, *new)),
            _ => None,
        });
        let (node, old, new) = first_rtt.expect("no rtt notification");
        assert_eq!(node, 0);
        assert_eq!(old, SimTime::ZERO);
        // two propagation delays in each direction at least
        assert!(new >= SimTime::from_millis(22));
    }

    #[test]
    fn max_bytes_is_delivered_exactly() {
        let config = SimConfig {
            max_bytes: 10_000,
            ..short_config()
        };
        let mut sim = Simulator::new(config);
        sim.run_until_complete();

        let report = sim.export_report();
        assert_eq!(report.total_rx_bytes, 10_000);
        assert_eq!(report.sender.timeouts, 0);
        assert_eq!(report.sender.retransmissions, 0);
    }

    #[test]
    fn random_loss_is_recovered_and_reproducible() {
        let mut config = short_config();
        config.bottleneck_link.loss_rate = 0.02;
        config.seed = 7;
        config.tcp_variant = TcpVariant::TcpReno;

        let mut first = Simulator::new(config.clone());
        first.run_until_complete();
        let mut second = Simulator::new(config);
        second.run_until_complete();

        let report = first.export_report();
        assert!(report.loss_drops() > 0);
        assert!(report.sender.retransmissions > 0);
        assert!(report.total_rx_bytes > 0);
        assert_eq!(report.total_rx_bytes, second.total_rx_bytes());
    }

    #[test]
    fn nothing_happens_before_the_source_starts() {
        let config = SimConfig {
            sim_time: 0.5,
            ..Default::default()
        };
        let mut sim = Simulator::new(config);
        sim.run_until_complete();
        assert_eq!(sim.total_rx_bytes(), 0);
        assert_eq!(sim.export_report().sender.segments_sent, 0);
    }
}
