use anyhow::Result;
use clap::Parser;
use tracing::info;

use reno_sim_cli::{Args, init_logging, print_summary, run, write_report};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("reno-sim starting…");

    let options = args.resolve()?;
    let summary = run(&options)?;

    print_summary(&mut std::io::stdout().lock(), &summary)?;

    if let Some(path) = &args.trace_out {
        write_report(path, &summary)?;
    }

    Ok(())
}
