use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// TCP Header flags
pub mod flags {
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

/// Bytes added in front of every TCP payload on a point-to-point link.
pub const PPP_HEADER_LEN: u32 = 2;
pub const IPV4_HEADER_LEN: u32 = 20;
pub const TCP_HEADER_LEN: u32 = 20;

/// Largest payload whose IPv4 total length still fits the 16-bit field.
pub const MAX_SEGMENT_SIZE: u32 = u16::MAX as u32 - IPV4_HEADER_LEN - TCP_HEADER_LEN;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Absolute sequence number; the initial sequence number is always 0.
    pub seq_num: u64,
    /// Absolute acknowledgment number.
    pub ack_num: u64,
    pub flags: u8,
    pub window_size: u16,
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16, seq: u64, ack: u64, flags: u8) -> Self {
        Self {
            src_port,
            dst_port,
            seq_num: seq,
            ack_num: ack,
            flags,
            window_size: u16::MAX,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    /// Swap ports for a reply travelling the other way.
    pub fn reply(&self, seq: u64, ack: u64, flags: u8) -> Self {
        Self::new(self.dst_port, self.src_port, seq, ack, flags)
    }
}

/// An IPv4/TCP segment in flight. Payload bytes are not materialised; only
/// their count travels with the packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    pub uid: u64,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub header: TcpHeader,
    pub payload_len: u32,
}

impl Packet {
    pub fn new(uid: u64, src: Ipv4Addr, dst: Ipv4Addr, header: TcpHeader, payload_len: u32) -> Self {
        Self {
            uid,
            src,
            dst,
            ttl: 64,
            header,
            payload_len,
        }
    }

    /// Length of the IPv4 datagram (IP header + TCP header + payload).
    pub fn ip_len(&self) -> u32 {
        (IPV4_HEADER_LEN + TCP_HEADER_LEN).saturating_add(self.payload_len)
    }

    /// Length of the frame as serialized on a point-to-point link.
    pub fn wire_len(&self) -> u32 {
        PPP_HEADER_LEN.saturating_add(self.ip_len())
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_SEGMENT_SIZE, Packet, TcpHeader, flags};
    use std::net::Ipv4Addr;

    #[test]
    fn wire_length_counts_all_headers() {
        let header = TcpHeader::new(49153, 9, 0, 0, flags::ACK);
        let packet = Packet::new(
            1,
            Ipv4Addr::new(10, 1, 1, 1),
            Ipv4Addr::new(10, 1, 2, 2),
            header,
            536,
        );
        assert_eq!(packet.ip_len(), 576);
        assert_eq!(packet.wire_len(), 578);
    }

    #[test]
    fn largest_segment_fills_the_ip_length_field() {
        let header = TcpHeader::new(49153, 9, 0, 0, flags::ACK);
        let packet = Packet::new(
            1,
            Ipv4Addr::new(10, 1, 1, 1),
            Ipv4Addr::new(10, 1, 2, 2),
            header.clone(),
            MAX_SEGMENT_SIZE,
        );
        assert_eq!(packet.ip_len(), u16::MAX as u32);

        let oversized = Packet::new(
            2,
            Ipv4Addr::new(10, 1, 1, 1),
            Ipv4Addr::new(10, 1, 2, 2),
            header,
            u32::MAX,
        );
        assert_eq!(oversized.wire_len(), u32::MAX);
    }

    #[test]
    fn reply_swaps_ports() {
        let header = TcpHeader::new(49153, 9, 100, 0, 0);
        let reply = header.reply(0, 636, flags::ACK);
        assert_eq!((reply.src_port, reply.dst_port), (9, 49153));
        assert!(reply.is_ack());
        assert_eq!(reply.ack_num, 636);
    }
}
