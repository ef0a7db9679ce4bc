use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan and run one transcode job
    Run {
        /// First input clip (path or HTTP(S) URL)
        #[arg(short = '1', long)]
        input1: String,

        /// Second input clip (path or HTTP(S) URL)
        #[arg(short = '2', long)]
        input2: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: String,

        /// Processor command: SMART_CONCAT (optionally with trim1=/trim2=/
        /// crf=/preset= overrides) or a template with {input1}/{input2}/
        /// {inputs}/{output} placeholders
        #[arg(long, default_value = "SMART_CONCAT")]
        command: String,

        /// Append a timestamp suffix to the output filename
        #[arg(long)]
        timestamp_output: bool,

        /// Kill the processor after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Probe a clip for its pixel dimensions
    Probe {
        /// Input clip (path or HTTP(S) URL)
        #[arg(short, long)]
        input: String,
    },

    /// Check that the probe and processor binaries are available
    Check,
}
