use anyhow::Result;
use clap::Parser;
use topklite::standalone::{engine, Args, Commands, Job};
use topklite::workload;
use tracing_subscriber::EnvFilter;

fn parse_args() -> Job {
    let args = Args::parse();
    match args.command {
        Commands::Submit {
            input,
            workload,
            output,
            num_buckets,
            args,
        } => Job {
            input,
            workload,
            output,
            num_buckets,
            args,
        },
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let job = parse_args();
    let app = workload::named(&job.workload)?;

    let summary = engine::run_job(&job, &app)?;
    println!(
        "{} categories written from {} input file(s), {} malformed record(s) skipped",
        summary.output_records, summary.input_files, summary.records_skipped
    );
    Ok(())
}
