use clap::{Parser, Subcommand};

pub mod engine;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a job to the local engine
    Submit {
        /// Glob spec for the input files
        #[arg(short, long)]
        input: String,

        // Name of the workload
        #[arg(short, long)]
        workload: String,

        /// Output directory
        #[arg(short, long)]
        output: String,

        /// Number of shuffle buckets (one output file per non-empty bucket)
        #[arg(short, long, default_value_t = 11)]
        num_buckets: u32,

        /// Auxiliary arguments to pass to the workload.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
}

/// A submitted job description.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub workload: String,
    pub output: String,
    pub num_buckets: u32,
    pub args: Vec<String>,
}
