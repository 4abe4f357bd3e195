use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::recorder::TraceRecorder;

pub const CWND_TRACE_FILE: &str = "cwnd-trace.dat";
pub const RTT_TRACE_FILE: &str = "rtt-trace.dat";
pub const THROUGHPUT_TRACE_FILE: &str = "throughput-trace.dat";

pub type FileRecorder = TraceRecorder<BufWriter<File>>;

/// Paths of the cwnd, RTT and throughput traces inside `dir`.
pub fn trace_paths(dir: &Path) -> [PathBuf; 3] {
    [
        dir.join(CWND_TRACE_FILE),
        dir.join(RTT_TRACE_FILE),
        dir.join(THROUGHPUT_TRACE_FILE),
    ]
}

fn open(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Create (truncating) the three trace files in `dir` and write their headers.
/// The directory must already exist.
pub fn create_trace_files(dir: &Path) -> Result<FileRecorder> {
    let [cwnd, rtt, throughput] = trace_paths(dir);
    let recorder = TraceRecorder::new(open(&cwnd)?, open(&rtt)?, open(&throughput)?)
        .with_context(|| format!("failed to write trace headers in {}", dir.display()))?;
    info!("Tracing enabled, writing traces to {}", dir.display());
    Ok(recorder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{CWND_HEADER, RTT_HEADER, THROUGHPUT_HEADER};
    use reno_sim_abstract::{SimTime, TraceSink};
    use tempfile::TempDir;

    #[test]
    fn files_carry_headers_and_lines() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let mut recorder = create_trace_files(dir).unwrap();
        recorder.on_congestion_window_change(SimTime::from_secs(1), 0, 0, 5360);
        recorder.close().unwrap();
        drop(recorder);

        let cwnd = std::fs::read_to_string(dir.join(CWND_TRACE_FILE)).unwrap();
        assert_eq!(cwnd, format!("{CWND_HEADER}\n1\t0\t0\t5360\n"));
        let rtt = std::fs::read_to_string(dir.join(RTT_TRACE_FILE)).unwrap();
        assert_eq!(rtt, format!("{RTT_HEADER}\n"));
        let throughput = std::fs::read_to_string(dir.join(THROUGHPUT_TRACE_FILE)).unwrap();
        assert_eq!(throughput, format!("{THROUGHPUT_HEADER}\n"));
    }

    #[test]
    fn missing_directory_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("missing");
        let err = create_trace_files(&dir).err().expect("directory does not exist");
        assert!(format!("{err:#}").contains(CWND_TRACE_FILE));
    }
}
