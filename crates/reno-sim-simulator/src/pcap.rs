//! Classic libpcap capture files for the point-to-point devices.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use reno_sim_abstract::{Packet, SimTime};

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const SNAPLEN: u32 = 65_535;
const LINKTYPE_PPP: u32 = 9;

const PPP_PROTO_IPV4: u16 = 0x0021;
const IPPROTO_TCP: u8 = 6;

fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        let word = u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = sum.wrapping_add(word);
    }
    if let Some(&byte) = chunks.remainder().first() {
        sum = sum.wrapping_add((byte as u32) << 8);
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Append the PPP frame carrying `packet` to `buf`. Payload bytes are zeros.
pub fn encode_frame(packet: &Packet, buf: &mut BytesMut) {
    buf.put_u16(PPP_PROTO_IPV4);

    let mut ip = [0u8; 20];
    {
        let mut w = &mut ip[..];
        w.put_u8(0x45);
        w.put_u8(0);
        w.put_u16(u16::try_from(packet.ip_len()).unwrap_or(u16::MAX));
        w.put_u16(packet.uid as u16);
        w.put_u16(0);
        w.put_u8(packet.ttl);
        w.put_u8(IPPROTO_TCP);
        w.put_u16(0);
        w.put_slice(&packet.src.octets());
        w.put_slice(&packet.dst.octets());
    }
    let sum = checksum(&ip);
    ip[10..12].copy_from_slice(&sum.to_be_bytes());
    buf.put_slice(&ip);

    let header = &packet.header;
    buf.put_u16(header.src_port);
    buf.put_u16(header.dst_port);
    // Absolute sequence space wraps onto the 32-bit wire field.
    buf.put_u32(header.seq_num as u32);
    buf.put_u32(header.ack_num as u32);
    buf.put_u8(5 << 4);
    buf.put_u8(header.flags);
    buf.put_u16(header.window_size);
    buf.put_u16(0);
    buf.put_u16(0);

    buf.put_bytes(0, packet.payload_len as usize);
}

pub struct PcapWriter<W: Write> {
    inner: W,
    frame: BytesMut,
    record: BytesMut,
}

impl<W: Write> PcapWriter<W> {
    pub fn new(mut inner: W) -> io::Result<Self> {
        let mut header = BytesMut::with_capacity(24);
        header.put_u32_le(PCAP_MAGIC);
        header.put_u16_le(PCAP_VERSION_MAJOR);
        header.put_u16_le(PCAP_VERSION_MINOR);
        header.put_i32_le(0);
        header.put_u32_le(0);
        header.put_u32_le(SNAPLEN);
        header.put_u32_le(LINKTYPE_PPP);
        inner.write_all(&header)?;
        Ok(Self {
            inner,
            frame: BytesMut::new(),
            record: BytesMut::with_capacity(16),
        })
    }

    pub fn write_packet(&mut self, time: SimTime, packet: &Packet) -> io::Result<()> {
        self.frame.clear();
        encode_frame(packet, &mut self.frame);
        let orig_len = self.frame.len() as u32;
        let incl_len = orig_len.min(SNAPLEN);

        let micros = time.as_micros();
        self.record.clear();
        self.record.put_u32_le((micros / 1_000_000) as u32);
        self.record.put_u32_le((micros % 1_000_000) as u32);
        self.record.put_u32_le(incl_len);
        self.record.put_u32_le(orig_len);
        self.inner.write_all(&self.record)?;
        self.inner.write_all(&self.frame[..incl_len as usize])
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// `<prefix>-<node>-<device>.pcap`, with `device` numbered the way ns-3 does:
/// index 0 of every node is its loopback, so point-to-point devices start at 1.
pub fn capture_path(dir: &Path, prefix: &str, node: u32, device_index: u32) -> PathBuf {
    let device = device_index + 1;
    dir.join(format!("{prefix}-{node}-{device}.pcap"))
}

/// One capture file per device, indexed like `Topology::devices`.
pub struct CaptureSet {
    writers: Vec<PcapWriter<BufWriter<File>>>,
    error: Option<io::Error>,
}

impl CaptureSet {
    pub fn create(paths: &[PathBuf]) -> io::Result<Self> {
        let writers = paths
            .iter()
            .map(|path| PcapWriter::new(BufWriter::new(File::create(path)?)))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self {
            writers,
            error: None,
        })
    }

    /// Record a frame seen on `device`. After the first write failure the set
    /// stops recording; the error surfaces from `close`.
    pub fn record(&mut self, device: usize, time: SimTime, packet: &Packet) {
        if self.error.is_some() {
            return;
        }
        let Some(writer) = self.writers.get_mut(device) else {
            return;
        };
        if let Err(err) = writer.write_packet(time, packet) {
            tracing::warn!("packet capture on device {device} failed: {err}");
            self.error = Some(err);
        }
    }

    pub fn close(mut self) -> io::Result<()> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        for writer in &mut self.writers {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reno_sim_abstract::{TcpHeader, flags};
    use std::net::Ipv4Addr;

    fn data_packet() -> Packet {
        Packet::new(
            7,
            Ipv4Addr::new(10, 1, 1, 1),
            Ipv4Addr::new(10, 1, 2, 2),
            TcpHeader::new(49153, 9, 536, 0, flags::ACK | flags::PSH),
            536,
        )
    }

    #[test]
    fn frame_layout_and_ip_checksum() {
        let mut buf = BytesMut::new();
        encode_frame(&data_packet(), &mut buf);

        assert_eq!(buf.len(), 578);
        assert_eq!(&buf[..2], &[0x00, 0x21]);
        let ip = &buf[2..22];
        assert_eq!(ip[0], 0x45);
        assert_eq!(u16::from_be_bytes([ip[2], ip[3]]), 576);
        assert_eq!(ip[9], 6);
        assert_eq!(&ip[12..16], &[10, 1, 1, 1]);
        assert_eq!(&ip[16..20], &[10, 1, 2, 2]);
        // A valid header sums to zero including its checksum.
        assert_eq!(checksum(ip), 0);

        let tcp = &buf[22..42];
        assert_eq!(u16::from_be_bytes([tcp[0], tcp[1]]), 49153);
        assert_eq!(u16::from_be_bytes([tcp[2], tcp[3]]), 9);
        assert_eq!(u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]), 536);
        assert_eq!(tcp[13], flags::ACK | flags::PSH);
    }

    #[test]
    fn writer_emits_global_header_and_records() {
        let mut writer = PcapWriter::new(Vec::new()).unwrap();
        writer
            .write_packet(SimTime::from_micros(1_250_000), &data_packet())
            .unwrap();
        let out = writer.into_inner();

        assert_eq!(&out[..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert_eq!(u32::from_le_bytes(out[20..24].try_into().unwrap()), LINKTYPE_PPP);

        let record = &out[24..40];
        assert_eq!(u32::from_le_bytes(record[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(record[4..8].try_into().unwrap()), 250_000);
        assert_eq!(u32::from_le_bytes(record[8..12].try_into().unwrap()), 578);
        assert_eq!(out.len(), 24 + 16 + 578);
    }

    #[test]
    fn capture_names_follow_node_and_device() {
        let first = capture_path(Path::new("results"), "reno-sim", 1, 0);
        assert_eq!(first, Path::new("results/reno-sim-1-1.pcap"));
        let second = capture_path(Path::new("results"), "reno-sim", 1, 1);
        assert_eq!(second, Path::new("results/reno-sim-1-2.pcap"));
    }
}
