use std::collections::VecDeque;

use reno_sim_abstract::{SimConfig, SimTime, SocketContext, TcpEndpoint, TcpHeader, flags};
use serde::{Deserialize, Serialize};

use super::congestion::{CongestionControl, Window, congestion_control_for};
use super::rtt::RttEstimator;

pub const RETRANSMIT_TIMER: u32 = 1;

const DUP_ACK_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStats {
    pub segments_sent: u64,
    pub bytes_sent: u64,
    pub retransmissions: u64,
    pub fast_retransmits: u64,
    pub timeouts: u64,
    pub duplicate_acks: u64,
}

#[derive(Debug)]
struct SentSegment {
    seq: u64,
    len: u32,
    sent_at: SimTime,
    retransmitted: bool,
}

impl SentSegment {
    fn end(&self) -> u64 {
        self.seq + self.len as u64
    }
}

/// Bulk-send application and its TCP socket: offers data as fast as the
/// congestion window allows, up to an optional byte limit.
pub struct BulkSender {
    cc: Box<dyn CongestionControl>,
    window: Window,
    local_port: u16,
    remote_port: u16,
    /// 0 means unlimited.
    max_bytes: u64,
    running: bool,

    snd_una: u64,
    snd_nxt: u64,
    /// One past the highest byte ever transmitted.
    high_tx: u64,
    dup_acks: u32,
    in_recovery: bool,
    recover: u64,

    rtt: RttEstimator,
    /// Most recent RTT sample, as last reported through the context.
    last_rtt: SimTime,
    /// Congestion window as last reported through the context.
    reported_cwnd: u32,
    history: VecDeque<SentSegment>,
    timer_armed: bool,
    stats: SenderStats,
}

impl BulkSender {
    pub fn new(config: &SimConfig, local_port: u16, remote_port: u16) -> Self {
        Self {
            cc: congestion_control_for(config.tcp_variant),
            window: Window::new(config.segment_size, config.initial_cwnd),
            local_port,
            remote_port,
            max_bytes: config.max_bytes,
            running: false,
            snd_una: 0,
            snd_nxt: 0,
            high_tx: 0,
            dup_acks: 0,
            in_recovery: false,
            recover: 0,
            rtt: RttEstimator::default(),
            last_rtt: SimTime::ZERO,
            reported_cwnd: 0,
            history: VecDeque::new(),
            timer_armed: false,
            stats: SenderStats::default(),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    pub fn congestion_control(&self) -> &str {
        self.cc.name()
    }

    pub fn bytes_acked(&self) -> u64 {
        self.snd_una
    }

    pub fn in_recovery(&self) -> bool {
        self.in_recovery
    }

    fn bytes_in_flight(&self) -> u64 {
        self.snd_nxt - self.snd_una
    }

    fn segment_len_at(&self, seq: u64) -> u32 {
        let seg = self.window.segment_size as u64;
        let remaining = match self.max_bytes {
            0 => seg,
            limit => limit.saturating_sub(seq),
        };
        remaining.min(seg) as u32
    }

    fn report_cwnd(&mut self, ctx: &mut dyn SocketContext) {
        if self.window.cwnd != self.reported_cwnd {
            ctx.congestion_window_changed(self.reported_cwnd, self.window.cwnd);
            self.reported_cwnd = self.window.cwnd;
        }
    }

    fn arm_timer(&mut self, ctx: &mut dyn SocketContext) {
        ctx.start_timer(self.rtt.rto(), RETRANSMIT_TIMER);
        self.timer_armed = true;
    }

    fn disarm_timer(&mut self, ctx: &mut dyn SocketContext) {
        if self.timer_armed {
            ctx.cancel_timer(RETRANSMIT_TIMER);
            self.timer_armed = false;
        }
    }

    fn transmit(&mut self, ctx: &mut dyn SocketContext, seq: u64, len: u32) {
        let header = TcpHeader::new(
            self.local_port,
            self.remote_port,
            seq,
            0,
            flags::ACK | flags::PSH,
        );
        ctx.send_segment(header, len);
        self.stats.segments_sent += 1;
        self.stats.bytes_sent += len as u64;

        let end = seq + len as u64;
        if seq < self.high_tx {
            self.stats.retransmissions += 1;
            for sent in self.history.iter_mut() {
                if sent.seq < end && seq < sent.end() {
                    sent.retransmitted = true;
                }
            }
        } else {
            self.history.push_back(SentSegment {
                seq,
                len,
                sent_at: ctx.now(),
                retransmitted: false,
            });
        }
        self.high_tx = self.high_tx.max(end);

        if !self.timer_armed {
            self.arm_timer(ctx);
        }
    }

    fn try_send(&mut self, ctx: &mut dyn SocketContext) {
        if !self.running {
            return;
        }
        loop {
            let len = self.segment_len_at(self.snd_nxt);
            if len == 0 {
                break;
            }
            if self.bytes_in_flight() + len as u64 > self.window.cwnd as u64 {
                break;
            }
            self.transmit(ctx, self.snd_nxt, len);
            self.snd_nxt += len as u64;
        }
    }

    fn sample_rtt(&mut self, ctx: &mut dyn SocketContext, ack: u64) {
        let mut sample = None;
        while let Some(front) = self.history.front() {
            if front.end() > ack {
                break;
            }
            if let Some(sent) = self.history.pop_front() {
                sample = (!sent.retransmitted).then(|| ctx.now() - sent.sent_at);
            }
        }
        // Karn: only the newest fully acknowledged segment counts, and only if never resent.
        if let Some(rtt) = sample {
            self.rtt.update(rtt);
            if rtt != self.last_rtt {
                ctx.rtt_changed(self.last_rtt, rtt);
                self.last_rtt = rtt;
            }
        }
    }

    fn on_new_ack(&mut self, ctx: &mut dyn SocketContext, ack: u64) {
        let acked = ack - self.snd_una;
        self.sample_rtt(ctx, ack);
        self.snd_una = ack;
        if self.snd_nxt < self.snd_una {
            self.snd_nxt = self.snd_una;
        }

        if self.in_recovery {
            if ack >= self.recover || !self.cc.holds_recovery_on_partial_ack() {
                ctx.log(&format!("leaving fast recovery at ack {ack}"));
                self.in_recovery = false;
                self.dup_acks = 0;
                self.window.cwnd = self.window.ssthresh;
            } else {
                // Partial ACK: resend the next hole and deflate by what was acknowledged.
                let acked = acked.min(u32::MAX as u64) as u32;
                self.window.cwnd = self.window.cwnd.saturating_sub(acked);
                if acked >= self.window.segment_size {
                    self.window.cwnd = self.window.cwnd.saturating_add(self.window.segment_size);
                }
                let len = self.segment_len_at(self.snd_una).max(1).min(
                    (self.high_tx - self.snd_una).min(u32::MAX as u64) as u32,
                );
                ctx.log(&format!("partial ack {ack}, retransmitting {}", self.snd_una));
                self.transmit(ctx, self.snd_una, len);
            }
        } else {
            self.dup_acks = 0;
            let segments = (acked / self.window.segment_size as u64).max(1);
            self.cc
                .increase_window(&mut self.window, segments.min(u32::MAX as u64) as u32);
        }

        if self.snd_una >= self.high_tx {
            self.disarm_timer(ctx);
        } else {
            self.arm_timer(ctx);
        }
        self.report_cwnd(ctx);
        self.try_send(ctx);
    }

    fn on_duplicate_ack(&mut self, ctx: &mut dyn SocketContext) {
        self.stats.duplicate_acks += 1;
        self.dup_acks += 1;

        if self.in_recovery {
            self.window.cwnd = self.window.cwnd.saturating_add(self.window.segment_size);
        } else if self.dup_acks == DUP_ACK_THRESHOLD {
            if self.cc.holds_recovery_on_partial_ack() && self.snd_una < self.recover {
                // Duplicates for data sent before the last loss event.
                return;
            }
            self.window.ssthresh = self.cc.ssthresh(&self.window, self.bytes_in_flight());
            self.window.cwnd = self
                .window
                .ssthresh
                .saturating_add(DUP_ACK_THRESHOLD * self.window.segment_size);
            self.recover = self.high_tx;
            self.in_recovery = true;
            self.stats.fast_retransmits += 1;
            ctx.log(&format!(
                "fast retransmit seq={} ssthresh={}",
                self.snd_una, self.window.ssthresh
            ));
            let len = self.segment_len_at(self.snd_una);
            self.transmit(ctx, self.snd_una, len);
            self.arm_timer(ctx);
        }
        self.report_cwnd(ctx);
        self.try_send(ctx);
    }

    fn on_retransmit_timeout(&mut self, ctx: &mut dyn SocketContext) {
        self.timer_armed = false;
        if self.snd_una >= self.high_tx {
            return;
        }
        self.stats.timeouts += 1;
        self.window.ssthresh = self.cc.ssthresh(&self.window, self.bytes_in_flight());
        self.window.cwnd = self.window.segment_size;
        self.in_recovery = false;
        self.dup_acks = 0;
        self.recover = self.high_tx;
        self.snd_nxt = self.snd_una;
        self.history.clear();
        self.rtt.backoff();
        ctx.log(&format!(
            "retransmission timeout, seq={} next rto={}s",
            self.snd_una,
            self.rtt.rto()
        ));
        self.report_cwnd(ctx);
        self.try_send(ctx);
    }
}

impl TcpEndpoint for BulkSender {
    fn start(&mut self, ctx: &mut dyn SocketContext) {
        ctx.log(&format!("bulk sender starting ({})", self.cc.name()));
        self.running = true;
        self.report_cwnd(ctx);
        self.try_send(ctx);
    }

    fn stop(&mut self, ctx: &mut dyn SocketContext) {
        ctx.log(&format!("bulk sender stopping after {} bytes acked", self.snd_una));
        self.running = false;
        self.disarm_timer(ctx);
    }

    fn on_segment(&mut self, ctx: &mut dyn SocketContext, header: &TcpHeader, payload_len: u32) {
        if !self.running || !header.is_ack() {
            return;
        }
        let ack = header.ack_num;
        if ack > self.snd_una && ack <= self.high_tx {
            self.on_new_ack(ctx, ack);
        } else if ack == self.snd_una && payload_len == 0 && self.high_tx > self.snd_una {
            self.on_duplicate_ack(ctx);
        }
    }

    fn on_timer(&mut self, ctx: &mut dyn SocketContext, timer_id: u32) {
        if timer_id == RETRANSMIT_TIMER && self.running {
            self.on_retransmit_timeout(ctx);
        }
    }
}
