use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use heicjpg::{BatchReport, ConvertConfig, Converter, JobState, ProgressEvent, QualityPolicy};

#[derive(Parser)]
#[command(name = "heicjpg")]
#[command(about = "Convert a directory of HEIC photos to size-limited JPEGs", long_about = None)]
#[command(version)]
struct Args {
    /// Directory containing the HEIC files
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Directory the JPEGs are written to, created if missing
    #[arg(value_name = "DEST")]
    destination: PathBuf,

    /// Number of worker threads, defaults to the number of logical CPUs
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<usize>,

    /// Longest side of the output, in pixels
    #[arg(long, value_name = "PIXELS")]
    max_side: Option<u32>,

    /// Size budget per output file, in KB
    #[arg(long, value_name = "KB")]
    max_size_kb: Option<u64>,

    /// Lowest JPEG quality tried before accepting an oversized file (1-100)
    #[arg(long, value_name = "QUALITY")]
    min_quality: Option<u8>,

    /// JPEG quality of the first attempt (1-100)
    #[arg(long, value_name = "QUALITY")]
    start_quality: Option<u8>,

    /// Quality decrement between attempts
    #[arg(long, value_name = "STEP")]
    quality_step: Option<u8>,

    /// Include HEIC files in subdirectories, mirroring the layout
    #[arg(short, long, default_value_t)]
    recursive: bool,

    /// Don't copy the source file timestamps onto the output
    #[arg(long, default_value_t)]
    no_preserve_times: bool,

    /// Store the resulting settings as defaults for later runs
    #[arg(long, default_value_t)]
    save_config: bool,

    /// Verbose output
    #[arg(short, long, default_value_t)]
    verbose: bool,

    /// Quiet mode (no logging, no progress bar)
    #[arg(short, long, default_value_t)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    setup_logging(args.verbose, args.quiet);

    if !args.source.is_dir() {
        anyhow::bail!("Input directory does not exist: {}", args.source.display());
    }

    let config = build_config(&args, ConvertConfig::load().unwrap_or_default())?;
    log::debug!("Using config: {config:?}");

    if args.save_config {
        match config.save() {
            Some(path) => log::info!("Saved settings to {}", path.display()),
            None => log::warn!("Could not save settings"),
        }
    }

    let converter = Converter::new(config);
    let report = if args.quiet {
        converter.run(&args.source, &args.destination)
    } else {
        run_with_progress_bar(&converter, &args)
    }
    .context("Conversion failed")?;

    if !args.quiet {
        print_summary(&report);
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Flags win over the saved settings, which win over the built-in defaults
fn build_config(args: &Args, base: ConvertConfig) -> Result<ConvertConfig> {
    let quality = QualityPolicy {
        start: args.start_quality.unwrap_or(base.quality.start),
        floor: args.min_quality.unwrap_or(base.quality.floor),
        step: args.quality_step.unwrap_or(base.quality.step),
    };

    if !(1..=100).contains(&quality.start) || !(1..=100).contains(&quality.floor) {
        anyhow::bail!("Quality must be between 1 and 100");
    }

    if quality.floor > quality.start {
        anyhow::bail!(
            "Minimum quality ({}) is above the starting quality ({})",
            quality.floor,
            quality.start
        );
    }

    if quality.step == 0 {
        anyhow::bail!("Quality step must be at least 1");
    }

    let max_side = args.max_side.unwrap_or(base.max_side);
    if max_side == 0 {
        anyhow::bail!("Maximum side length must be positive");
    }

    let max_bytes = match args.max_size_kb {
        Some(kb) => kb.saturating_mul(1024),
        None => base.max_bytes,
    };
    if max_bytes == 0 {
        anyhow::bail!("Size budget must be positive");
    }

    if args.threads == Some(0) {
        anyhow::bail!("Thread count must be positive");
    }

    Ok(ConvertConfig {
        max_side,
        max_bytes,
        quality,
        threads: args.threads.or(base.threads),
        recursive: args.recursive || base.recursive,
        preserve_times: !args.no_preserve_times && base.preserve_times,
    })
}

fn run_with_progress_bar(converter: &Converter, args: &Args) -> Result<BatchReport> {
    let (event_tx, event_rx) = mpsc::channel();

    thread::scope(|s| {
        s.spawn(move || render_progress(event_rx));

        let result =
            converter.run_with_progress(&args.source, &args.destination, Some(&event_tx));
        // the renderer also stops when the batch aborts before completing
        drop(event_tx);
        result
    })
}

fn render_progress(events: mpsc::Receiver<ProgressEvent>) {
    let bar = ProgressBar::hidden();

    for event in events {
        match event {
            ProgressEvent::Started { total } => {
                bar.set_length(total as u64);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            }
            ProgressEvent::Registered { .. } => {}
            ProgressEvent::Stage { state, .. } => {
                if state.is_terminal() {
                    bar.inc(1);
                }
                if state == JobState::Failed {
                    bar.set_message("(with failures)");
                }
            }
            ProgressEvent::BatchComplete => break,
        }
    }

    bar.finish_and_clear();
}

fn print_summary(report: &BatchReport) {
    log::info!(
        "{} converted, {} failed, {} over budget ({:.1?})",
        report.succeeded(),
        report.failed(),
        report.oversized(),
        report.elapsed
    );
}
