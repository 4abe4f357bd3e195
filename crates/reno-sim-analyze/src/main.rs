use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use reno_sim_analyze::{analyze_dir, load_run_report, print_report};

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarize the traces of a reno-sim run")]
struct Args {
    /// Directory holding cwnd-trace.dat, rtt-trace.dat and throughput-trace.dat.
    #[arg(long, default_value = "results")]
    dir: PathBuf,

    /// JSON report of the same run (`reno-sim --trace-out`), adding packet
    /// and TCP event counts.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the summary as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    let mut report = analyze_dir(&args.dir)?;
    if let Some(path) = &args.report {
        report = report.with_run(&load_run_report(path)?);
    }
    let mut out = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report).context("Failed to serialize analysis")?;
        writeln!(out)?;
    } else {
        print_report(&mut out, &report)?;
    }
    Ok(())
}
