use std::io::{self, Write};

use reno_sim_abstract::{SimTime, TraceSink};

use crate::throughput::{ThroughputAggregator, ThroughputSample};

pub const CWND_HEADER: &str = "# Time\tNodeId\tOldCwnd\tNewCwnd";
pub const RTT_HEADER: &str = "# Time\tNodeId\tOldRtt(ms)\tNewRtt(ms)";
pub const THROUGHPUT_HEADER: &str = "# Time\tThroughput(Mbps)";

/// Data lines written so far, headers excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounts {
    pub cwnd: u64,
    pub rtt: u64,
    pub throughput: u64,
}

/// Appends one tab-separated line per notification to the matching stream.
///
/// Callbacks cannot fail; the first I/O error is kept and returned from
/// [`TraceSink::close`].
pub struct TraceRecorder<W: Write> {
    cwnd: W,
    rtt: W,
    throughput: W,
    aggregator: ThroughputAggregator,
    lines: LineCounts,
    error: Option<io::Error>,
}

impl<W: Write> TraceRecorder<W> {
    pub fn new(cwnd: W, rtt: W, throughput: W) -> io::Result<Self> {
        Self::with_aggregator(cwnd, rtt, throughput, ThroughputAggregator::default())
    }

    /// Writes the header line of each stream before returning.
    pub fn with_aggregator(
        mut cwnd: W,
        mut rtt: W,
        mut throughput: W,
        aggregator: ThroughputAggregator,
    ) -> io::Result<Self> {
        writeln!(cwnd, "{CWND_HEADER}")?;
        writeln!(rtt, "{RTT_HEADER}")?;
        writeln!(throughput, "{THROUGHPUT_HEADER}")?;
        Ok(Self {
            cwnd,
            rtt,
            throughput,
            aggregator,
            lines: LineCounts::default(),
            error: None,
        })
    }

    pub fn aggregator(&self) -> &ThroughputAggregator {
        &self.aggregator
    }

    pub fn line_counts(&self) -> LineCounts {
        self.lines
    }

    pub fn into_writers(self) -> (W, W, W) {
        (self.cwnd, self.rtt, self.throughput)
    }

    fn keep_first_error(&mut self, result: io::Result<()>) {
        if let Err(err) = result {
            if self.error.is_none() {
                tracing::warn!("trace write failed: {err}");
                self.error = Some(err);
            }
        }
    }

    fn write_throughput(&mut self, sample: ThroughputSample) {
        let result = writeln!(self.throughput, "{}\t{}", sample.time, sample.mbps);
        self.lines.throughput += 1;
        self.keep_first_error(result);
    }
}

impl<W: Write> TraceSink for TraceRecorder<W> {
    fn on_congestion_window_change(&mut self, now: SimTime, node: u32, old: u32, new: u32) {
        let result = writeln!(self.cwnd, "{now}\t{node}\t{old}\t{new}");
        self.lines.cwnd += 1;
        self.keep_first_error(result);
    }

    fn on_rtt_change(&mut self, now: SimTime, node: u32, old: SimTime, new: SimTime) {
        let result = writeln!(
            self.rtt,
            "{now}\t{node}\t{}\t{}",
            old.as_millis(),
            new.as_millis()
        );
        self.lines.rtt += 1;
        self.keep_first_error(result);
    }

    fn on_packet_received(&mut self, now: SimTime, bytes: u32) {
        if let Some(sample) = self.aggregator.record(now, bytes) {
            self.write_throughput(sample);
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let flushed = self
            .cwnd
            .flush()
            .and_then(|_| self.rtt.flush())
            .and_then(|_| self.throughput.flush());
        match self.error.take() {
            Some(err) => Err(err),
            None => flushed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> TraceRecorder<Vec<u8>> {
        TraceRecorder::new(Vec::new(), Vec::new(), Vec::new()).unwrap()
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn headers_are_written_up_front() {
        let (cwnd, rtt, throughput) = recorder().into_writers();
        assert_eq!(lines(&cwnd), vec![CWND_HEADER]);
        assert_eq!(lines(&rtt), vec![RTT_HEADER]);
        assert_eq!(lines(&throughput), vec![THROUGHPUT_HEADER]);
    }

    #[test]
    fn cwnd_and_rtt_lines_are_tab_separated() {
        let mut rec = recorder();
        rec.on_congestion_window_change(SimTime::from_secs(1), 0, 0, 5360);
        rec.on_congestion_window_change(SimTime::from_millis(1027), 0, 5360, 5896);
        rec.on_rtt_change(
            SimTime::from_millis(1027),
            0,
            SimTime::ZERO,
            SimTime::from_micros(27_460),
        );
        assert_eq!(
            rec.line_counts(),
            LineCounts {
                cwnd: 2,
                rtt: 1,
                throughput: 0
            }
        );

        let (cwnd, rtt, _) = rec.into_writers();
        assert_eq!(
            lines(&cwnd),
            vec![CWND_HEADER, "1\t0\t0\t5360", "1.027\t0\t5360\t5896"]
        );
        assert_eq!(lines(&rtt), vec![RTT_HEADER, "1.027\t0\t0\t27"]);
    }

    #[test]
    fn throughput_lines_follow_the_aggregator() {
        let mut rec = recorder();
        rec.on_packet_received(SimTime::ZERO, 12_500);
        rec.on_packet_received(SimTime::from_millis(50), 12_500);
        rec.on_packet_received(SimTime::from_millis(100), 0);
        rec.on_packet_received(SimTime::from_millis(120), 536);

        assert_eq!(rec.line_counts().throughput, 1);
        assert_eq!(rec.aggregator().pending_bytes(), 536);
        let (_, _, throughput) = rec.into_writers();
        assert_eq!(lines(&throughput), vec![THROUGHPUT_HEADER, "0.1\t2"]);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn header_failure_is_reported() {
        assert!(TraceRecorder::new(FailingWriter, FailingWriter, FailingWriter).is_err());
    }

    #[test]
    fn write_failures_surface_on_close() {
        let mut rec = recorder();
        assert!(rec.close().is_ok());

        // Headers would already fail, so build past them.
        let mut failing = TraceRecorder {
            cwnd: FailingWriter,
            rtt: FailingWriter,
            throughput: FailingWriter,
            aggregator: ThroughputAggregator::default(),
            lines: LineCounts::default(),
            error: None,
        };
        failing.on_congestion_window_change(SimTime::ZERO, 0, 0, 1);
        failing.on_rtt_change(SimTime::ZERO, 0, SimTime::ZERO, SimTime::from_millis(5));
        let err = failing.close().unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }
}
