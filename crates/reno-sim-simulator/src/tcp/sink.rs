use std::collections::BTreeMap;

use reno_sim_abstract::{SocketContext, TcpEndpoint, TcpHeader, flags};

/// Packet-sink application: accepts the byte stream, buffers anything that
/// arrives out of order and acknowledges every data segment cumulatively.
#[derive(Debug, Default)]
pub struct PacketSink {
    running: bool,
    rcv_nxt: u64,
    /// Out-of-order segments keyed by sequence number.
    reassembly: BTreeMap<u64, u32>,
    total_rx: u64,
}

impl PacketSink {
    pub fn total_rx(&self) -> u64 {
        self.total_rx
    }

    pub fn buffered_segments(&self) -> usize {
        self.reassembly.len()
    }

    fn deliver_up_to(&mut self, ctx: &mut dyn SocketContext, end: u64) {
        if end <= self.rcv_nxt {
            return;
        }
        let bytes = (end - self.rcv_nxt).min(u32::MAX as u64) as u32;
        self.rcv_nxt = end;
        self.total_rx += bytes as u64;
        ctx.deliver_data(bytes);
    }

    fn drain_reassembly(&mut self, ctx: &mut dyn SocketContext) {
        while let Some((&seq, &len)) = self.reassembly.first_key_value() {
            if seq > self.rcv_nxt {
                break;
            }
            self.reassembly.pop_first();
            self.deliver_up_to(ctx, seq + len as u64);
        }
    }
}

impl TcpEndpoint for PacketSink {
    fn start(&mut self, ctx: &mut dyn SocketContext) {
        ctx.log("packet sink listening");
        self.running = true;
    }

    fn stop(&mut self, ctx: &mut dyn SocketContext) {
        ctx.log(&format!("packet sink stopping, {} bytes received", self.total_rx));
        self.running = false;
    }

    fn on_segment(&mut self, ctx: &mut dyn SocketContext, header: &TcpHeader, payload_len: u32) {
        if !self.running || payload_len == 0 {
            return;
        }
        let seq = header.seq_num;
        let end = seq + payload_len as u64;
        if seq <= self.rcv_nxt {
            self.deliver_up_to(ctx, end);
            self.drain_reassembly(ctx);
        } else {
            let slot = self.reassembly.entry(seq).or_insert(0);
            *slot = (*slot).max(payload_len);
        }
        ctx.send_segment(header.reply(0, self.rcv_nxt, flags::ACK), 0);
    }

    fn on_timer(&mut self, _ctx: &mut dyn SocketContext, _timer_id: u32) {}
}
