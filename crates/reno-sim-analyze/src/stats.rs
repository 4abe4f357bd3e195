use serde::Serialize;

use crate::parse::{CwndRecord, RttRecord, ThroughputRecord};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CwndStats {
    pub samples: usize,
    pub initial: u32,
    pub min: u32,
    pub max: u32,
    pub mean: f64,
    pub std_dev: f64,
    /// Changes where the window shrank.
    pub reductions: usize,
    /// 100 minus the mean step size as a percentage of the mean window,
    /// floored at 0. A single sample counts as fully stable.
    pub stability_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RttStats {
    pub samples: usize,
    pub min_ms: u64,
    pub mean_ms: f64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputStats {
    pub samples: usize,
    pub mean_mbps: f64,
    pub peak_mbps: f64,
    pub peak_time: f64,
}

/// Population statistics over the new-window column.
pub fn cwnd_stats(records: &[CwndRecord]) -> Option<CwndStats> {
    let first = records.first()?;
    let values: Vec<f64> = records.iter().map(|r| r.new as f64).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(CwndStats {
        samples: records.len(),
        initial: first.new,
        min: records.iter().map(|r| r.new).min().unwrap_or(0),
        max: records.iter().map(|r| r.new).max().unwrap_or(0),
        mean,
        std_dev: variance.sqrt(),
        reductions: records.iter().filter(|r| r.new < r.old).count(),
        stability_pct: stability_pct(&values, mean),
    })
}

fn stability_pct(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 || mean <= 0.0 {
        return 100.0;
    }
    let steps = values.windows(2).map(|w| (w[1] - w[0]).abs() / mean);
    let mean_step = steps.sum::<f64>() / (values.len() - 1) as f64;
    (100.0 - mean_step * 100.0).max(0.0)
}

/// Zero entries stand for "no estimate yet" and are skipped.
pub fn rtt_stats(records: &[RttRecord]) -> Option<RttStats> {
    let values: Vec<u64> = records
        .iter()
        .map(|r| r.new_ms)
        .filter(|&ms| ms > 0)
        .collect();
    let min_ms = *values.iter().min()?;
    let max_ms = *values.iter().max()?;
    Some(RttStats {
        samples: values.len(),
        min_ms,
        mean_ms: values.iter().sum::<u64>() as f64 / values.len() as f64,
        max_ms,
    })
}

pub fn throughput_stats(records: &[ThroughputRecord]) -> Option<ThroughputStats> {
    let peak = records
        .iter()
        .copied()
        .max_by(|a, b| a.mbps.total_cmp(&b.mbps))?;
    Some(ThroughputStats {
        samples: records.len(),
        mean_mbps: records.iter().map(|r| r.mbps).sum::<f64>() / records.len() as f64,
        peak_mbps: peak.mbps,
        peak_time: peak.time,
    })
}
