//! archivey-ocr - OCR ingestion for archived records
//!
//! Extracts text from scanned documents with a configurable engine
//! (Tesseract, Google Cloud Vision or Azure Computer Vision), optional image
//! preprocessing and QR detection, and stores the results next to the
//! record archive.

mod config;
mod error;
mod storage;
mod vision;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::OcrConfig;
use crate::vision::{OcrService, ProcessOptions};

/// Exit code when at least one file failed to process
const EXIT_OCR_FAILED: u8 = 2;

/// archivey-ocr - text extraction for archived documents
#[derive(Parser, Debug)]
#[command(name = "archivey-ocr")]
#[command(about = "Extract text, metadata and QR codes from scanned documents")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured engine (tesseract, cloud_vision, azure_vision)
    #[arg(short, long, global = true)]
    engine: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run OCR on a single image
    Process {
        file: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run OCR on several images, one after another
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show the active engine's availability and languages
    Engines,
    /// Write the default configuration file
    InitConfig {
        /// Destination (defaults to the user config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Per-run options shared by `process` and `batch`
#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Recognition language (repeatable)
    #[arg(short, long = "lang")]
    languages: Vec<String>,

    /// Tesseract page segmentation mode
    #[arg(long)]
    psm: Option<u32>,

    /// Do not write artifacts to storage
    #[arg(long)]
    no_save: bool,

    /// Scan for QR codes even if disabled in configuration
    #[arg(long)]
    barcodes: bool,

    /// Skip image preprocessing
    #[arg(long)]
    no_preprocess: bool,
}

impl RunArgs {
    fn apply_to(&self, config: &mut OcrConfig) {
        if self.no_preprocess {
            config.preprocessing.enabled = false;
        }
    }

    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            languages: self.languages.clone(),
            psm: self.psm,
            save_results: self.no_save.then_some(false),
            detect_barcodes: self.barcodes.then_some(true),
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if let Command::InitConfig { output, force } = &args.command {
        init_logging("info")?;
        init_config(output.as_deref(), *force)?;
        return Ok(ExitCode::SUCCESS);
    }

    let (mut config, source) = load_or_create_config(args.config.as_deref())?;
    init_logging(&config.logging.level)?;

    match source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }

    if let Some(engine) = args.engine {
        config.default_engine = engine;
    }
    if config.storage.root.is_none() {
        config.storage.root = Some(storage::get_data_dir()?.join("storage"));
    }

    match args.command {
        Command::Process { file, run } => {
            run.apply_to(&mut config);
            let service = OcrService::new(config)?;
            let result = service.process(&file, &run.options());
            print_json(&result)?;
            Ok(exit_code(result.success))
        }
        Command::Batch { files, run } => {
            run.apply_to(&mut config);
            let service = OcrService::new(config)?;
            let results = service.process_batch(&files, &run.options());
            let all_ok = results.values().all(|r| r.success);
            info!(
                "Batch finished: {}/{} succeeded",
                results.values().filter(|r| r.success).count(),
                results.len()
            );
            print_json(&results)?;
            Ok(exit_code(all_ok))
        }
        Command::Engines => {
            let service = OcrService::new(config)?;
            info!("Storage root: {:?}", service.config().storage.root);
            print_json(&service.engine_status())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::InitConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Install the global subscriber; `RUST_LOG` wins over the configured level.
/// Logs go to stderr so stdout stays valid JSON.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load configuration from the given file, the user config directory, or
/// fall back to defaults. An explicit path must exist.
fn load_or_create_config(explicit: Option<&Path>) -> Result<(OcrConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        return Ok((config, Some(path.to_path_buf())));
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            let config = config::load_config(&config_path)?;
            return Ok((config, Some(config_path)));
        }
    }

    Ok((OcrConfig::default(), None))
}

fn init_config(output: Option<&Path>, force: bool) -> Result<()> {
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => storage::get_config_dir()?.join("config.toml"),
    };

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    config::save_config(&OcrConfig::default(), &path)?;
    info!("Wrote default configuration to {:?}", path);
    println!("{}", path.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_OCR_FAILED)
    }
}
