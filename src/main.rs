//! Clipstitch - Aspect-Aware FFmpeg Concat Runner
//!
//! Main entry point: parses the CLI, wires logging, and dispatches to the
//! workflow that plans and supervises the ffmpeg run.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipstitch::cli::{Args, Commands};
use clipstitch::config::Config;
use clipstitch::exec::{ProcessSupervisor, ProgressUpdate};
use clipstitch::probe::{FfprobeProber, MediaProberTrait};
use clipstitch::workflow::{JobRequest, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("clipstitch.toml").exists() {
                info!("Found clipstitch.toml in current directory, loading...");
                Config::from_file("clipstitch.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Run {
            input1,
            input2,
            output,
            command,
            timestamp_output,
            timeout_secs,
        } => {
            if timestamp_output {
                config.media.timestamp_output = true;
            }
            if timeout_secs.is_some() {
                config.media.timeout_secs = timeout_secs;
            }

            let workflow = Workflow::new(config);
            let request = JobRequest {
                input1,
                input2,
                output_path: output,
                command,
            };

            let bar = progress_bar();
            let observer = {
                let bar = bar.clone();
                move |update: &ProgressUpdate| {
                    bar.set_position(update.percent.round() as u64);
                    bar.set_message(format!("fps {} speed {}x", update.fps, update.speed));
                }
            };

            let result = workflow.run(&request, Some(&observer)).await;
            bar.finish_and_clear();

            println!("{}", result.status_message);
            if !result.output_path.is_empty() {
                println!("{}", result.output_path);
            }
            if result.status_message.starts_with("ERROR:") {
                std::process::exit(1);
            }
        }
        Commands::Probe { input } => {
            let prober = FfprobeProber::new(config.probe);
            match prober.probe(&input).await {
                Ok(dims) => {
                    println!("{}x{} ({:?})", dims.width, dims.height, dims.category());
                }
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Check => {
            let prober = FfprobeProber::new(config.probe);
            let supervisor = ProcessSupervisor::new(config.media);

            prober.check_availability().await?;
            println!("ffprobe: available");
            supervisor.check_availability().await?;
            println!("processor: available");
        }
    }

    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let work_dir = std::env::current_dir()?.join(".clipstitch");
    let log_dir = work_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "clipstitch.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
