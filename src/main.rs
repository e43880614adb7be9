//! JpegFit CLI - fit a folder of images into size-constrained JPEGs
//!
//! Without `--input` the tool runs in legacy mode: it converts `ToConvert`
//! into `Converted`, both next to the executable, offering to create
//! `ToConvert` on first run.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::{style, Term};
use indicatif::HumanDuration;
use tracing::{debug, info};

use jpegfit::discovery::count_files;
use jpegfit::{
    discover, init_logging, BatchCoordinator, BatchSummary, Config, ExtensionAllowList,
    FileTranscoder, ProgressReporter, SessionOutputDirectory,
};

const LEGACY_SOURCE_DIR: &str = "ToConvert";
const LEGACY_OUTPUT_DIR: &str = "Converted";

/// JpegFit - batch transcoder for size-constrained JPEGs
#[derive(Parser)]
#[command(
    name = "jpegfit",
    version,
    about = "Convert a folder of images into JPEGs that fit a size and dimension limit",
    long_about = "JpegFit converts every image in a folder into a JPEG no larger than a byte \
                  budget and no wider or taller than a pixel limit, keeping the highest quality \
                  that fits. Already-compliant JPEGs are copied untouched. Outputs go into a \
                  new timestamped folder per run."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Folder with the images to convert (omit for legacy ToConvert/Converted mode)
    #[arg(short, long, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Folder that receives the timestamped session folder
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Configuration file (.toml or .yaml)
    #[arg(short, long, value_name = "FILE", env = "JPEGFIT_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum output size in MiB
    #[arg(long, value_name = "MB")]
    max_size_mb: Option<f64>,

    /// Maximum output width and height in pixels
    #[arg(long, value_name = "PIXELS")]
    max_dimension: Option<u32>,

    /// Lowest JPEG quality to fall back to (1-100)
    #[arg(long, value_name = "QUALITY")]
    min_quality: Option<u8>,

    /// Number of worker threads (default: auto-detect)
    #[arg(short, long, value_name = "COUNT")]
    threads: Option<usize>,

    /// Width of the progress bar in ticks
    #[arg(long, value_name = "TICKS")]
    bar_width: Option<usize>,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// List the files that would be converted and stop
    #[arg(long)]
    dry_run: bool,

    /// Create a missing source folder without asking
    #[arg(short, long)]
    yes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file with every default spelled out
    ExampleConfig {
        /// Output file path (.toml or .yaml)
        #[arg(default_value = "jpegfit.toml")]
        output: PathBuf,
    },
    /// Validate a configuration file
    CheckConfig {
        /// Configuration file to validate
        file: PathBuf,
    },
}

/// Where a run reads from and writes to
struct RunDirs {
    source: PathBuf,
    output_root: PathBuf,
    legacy: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        if let Err(e) = handle_subcommand(command) {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            process::exit(1);
        }
        return;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            process::exit(1);
        }
    };

    // JSON goes to stdout alone; everything else moves to stderr
    let reporter = Arc::new(if cli.json {
        ProgressReporter::stderr()
    } else {
        ProgressReporter::stdout(&config.progress)
    });
    init_logging(&config.logging, &reporter);

    match run(&cli, &config, &reporter) {
        Ok(Some(summary)) => print_summary(&summary, cli.json),
        Ok(None) => {}
        Err(e) => {
            let _ = reporter.finish();
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            process::exit(1);
        }
    }
}

/// Handle subcommands
fn handle_subcommand(command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::ExampleConfig { output } => {
            Config::default().to_file(output)?;
            println!(
                "{}: Generated example configuration: {}",
                style("Success").green().bold(),
                output.display()
            );
        }
        Commands::CheckConfig { file } => {
            let config = Config::from_file(file)?;
            config.validate()?;
            println!("{}: Configuration file is valid", style("Success").green().bold());
            println!(
                "  Max size: {}, max dimension: {}px, quality {}..={}",
                indicatif::HumanBytes(config.limits.max_output_bytes),
                config.limits.max_dimension,
                config.limits.min_quality,
                config.limits.max_quality
            );
        }
    }
    Ok(())
}

/// Defaults, then the config file, then command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(mb) = cli.max_size_mb {
        anyhow::ensure!(mb.is_finite() && mb > 0.0, "--max-size-mb must be a positive number");
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bytes = (mb * 1024.0 * 1024.0).round() as u64;
        config.limits.max_output_bytes = bytes;
    }
    if let Some(max_dimension) = cli.max_dimension {
        config.limits.max_dimension = max_dimension;
    }
    if let Some(min_quality) = cli.min_quality {
        config.limits.min_quality = min_quality;
    }
    if let Some(threads) = cli.threads {
        config.processing.threads = Some(threads);
    }
    if let Some(bar_width) = cli.bar_width {
        config.progress.bar_width = bar_width;
    }
    if cli.no_progress || cli.quiet {
        config.progress.enabled = false;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    } else if cli.quiet {
        config.logging.level = "error".to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Legacy mode works next to the executable; CLI mode takes explicit paths
fn resolve_dirs(cli: &Cli) -> anyhow::Result<RunDirs> {
    if let Some(input) = &cli.input {
        let output_root = match &cli.output {
            Some(output) => output.clone(),
            None => input
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(LEGACY_OUTPUT_DIR),
        };
        return Ok(RunDirs {
            source: input.clone(),
            output_root,
            legacy: false,
        });
    }

    let exe = std::env::current_exe().context("Cannot locate the executable")?;
    let base = exe.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok(RunDirs {
        source: base.join(LEGACY_SOURCE_DIR),
        output_root: cli.output.clone().unwrap_or_else(|| base.join(LEGACY_OUTPUT_DIR)),
        legacy: true,
    })
}

/// First-run helper: offer to create the legacy source folder
fn bootstrap_source_dir(dir: &Path, assume_yes: bool, reporter: &ProgressReporter) -> anyhow::Result<()> {
    let term = Term::stdout();
    let create = if assume_yes {
        true
    } else if term.is_term() {
        term.write_str(&format!(
            "'{}' folder does not exist. Create it now? [y/N] ",
            dir.display()
        ))?;
        let answer = term.read_line()?;
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    } else {
        false
    };

    if create {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        say(reporter, &format!(
            "Created '{}'. Put the images to convert there and run again.",
            dir.display()
        ));
    } else {
        say(reporter, &format!("'{}' folder does not exist.", dir.display()));
    }
    Ok(())
}

/// Run one batch; `None` when the run stopped before converting (dry run)
fn run(cli: &Cli, config: &Config, reporter: &Arc<ProgressReporter>) -> anyhow::Result<Option<BatchSummary>> {
    let dirs = resolve_dirs(cli)?;
    debug!("Source {:?}, output root {:?}, legacy: {}", dirs.source, dirs.output_root, dirs.legacy);

    if dirs.legacy && !dirs.source.exists() {
        bootstrap_source_dir(&dirs.source, cli.yes, reporter)?;
    }

    let session = SessionOutputDirectory::starting_now(&dirs.output_root);
    let allow_list = ExtensionAllowList::default().with_extra(&config.processing.extra_extensions);
    let jobs = discover(&dirs.source, &allow_list, session.path())?;

    if !cli.quiet {
        if jobs.is_empty() {
            say(reporter, &format!("No image files found in '{}'.", dirs.source.display()));
        } else {
            say(reporter, &format!(
                "Contents of '{}' ({} files in total, {} images to convert):",
                dirs.source.display(),
                count_files(&dirs.source),
                jobs.len()
            ));
            for job in &jobs {
                say(reporter, &format!("- {}", job.file_name()));
            }
        }
    }

    if cli.dry_run {
        return Ok(None);
    }

    let transcoder = FileTranscoder::new(config.limits)?;
    info!("Converting with limits {:?}", transcoder.limits());
    let coordinator = BatchCoordinator::new(
        transcoder,
        Arc::clone(reporter),
        config.processing.worker_threads(),
    );
    info!(
        "Using {} worker threads, progress bar {}",
        coordinator.threads(),
        if reporter.is_visible() { "on" } else { "off" }
    );

    if !jobs.is_empty() && !cli.quiet {
        say(reporter, "Converting...");
    }

    Ok(Some(coordinator.run(jobs, &session)?))
}

fn say(reporter: &ProgressReporter, message: &str) {
    if let Err(e) = reporter.emit(message) {
        debug!("Console output failed: {}", e);
    }
}

/// Print processing summary
fn print_summary(summary: &BatchSummary, json_output: bool) {
    if json_output {
        match serde_json::to_string_pretty(summary) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{}: {}", style("Error").red().bold(), e),
        }
        return;
    }

    let counters = &summary.counters;
    println!();
    println!("{}", style("Conversion Summary:").bold());
    println!("  {}: {}", style("Succeeded").green(), counters.success);
    if counters.warnings > 0 {
        println!("  {}: {}", style("With warnings").yellow(), counters.warnings);
    }
    if counters.failure > 0 {
        println!("  {}: {}", style("Failed").red(), counters.failure);
    }
    println!("  {}: {}", style("Total").blue(), counters.processed);
    println!("  {}: {}", style("Duration").blue(), HumanDuration(summary.elapsed));
    if let Some(dir) = &summary.output_dir {
        println!("  {}: {}", style("Output").cyan(), dir.display());
    }
}
