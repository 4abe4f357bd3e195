use crate::packet::TcpHeader;
use crate::time::SimTime;
use std::io;

/// The capability the engine hands to a TCP endpoint while it handles an event.
/// Everything requested through it takes effect once the handler returns.
pub trait SocketContext {
    /// Send a segment to the peer endpoint.
    fn send_segment(&mut self, header: TcpHeader, payload_len: u32);

    /// Arm `timer_id` to fire after `delay`. Re-arming an armed timer replaces it.
    fn start_timer(&mut self, delay: SimTime, timer_id: u32);

    fn cancel_timer(&mut self, timer_id: u32);

    /// Hand in-order bytes to the application on top of this endpoint.
    fn deliver_data(&mut self, bytes: u32);

    fn log(&mut self, message: &str);

    fn now(&self) -> SimTime;

    /// Report a change of the congestion window, in bytes.
    fn congestion_window_changed(&mut self, _old: u32, _new: u32) {}

    /// Report a change of the most recent round-trip time sample.
    fn rtt_changed(&mut self, _old: SimTime, _new: SimTime) {}
}

/// One end of the simulated TCP connection.
pub trait TcpEndpoint {
    /// Called when the endpoint's application starts.
    fn start(&mut self, _ctx: &mut dyn SocketContext) {}

    /// Called when the endpoint's application stops.
    fn stop(&mut self, _ctx: &mut dyn SocketContext) {}

    /// Called when a segment addressed to this endpoint arrives.
    fn on_segment(&mut self, ctx: &mut dyn SocketContext, header: &TcpHeader, payload_len: u32);

    /// Called when a timer armed through `SocketContext::start_timer` expires.
    fn on_timer(&mut self, ctx: &mut dyn SocketContext, timer_id: u32);
}

/// Notification target registered with the engine when tracing is enabled.
///
/// The engine invokes these from its single dispatch loop, in nondecreasing
/// `now` order.
pub trait TraceSink {
    fn on_congestion_window_change(&mut self, now: SimTime, node: u32, old: u32, new: u32);

    fn on_rtt_change(&mut self, now: SimTime, node: u32, old: SimTime, new: SimTime);

    /// A chunk of `bytes` reached the sink application.
    fn on_packet_received(&mut self, now: SimTime, bytes: u32);

    /// Flush and release whatever the sink writes to. Called once, after the run.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
