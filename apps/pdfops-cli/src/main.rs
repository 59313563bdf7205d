//! pdfops command line
//!
//! Runs a single JSON operation request against local files and writes the
//! resulting PDF or ZIP to disk.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdfops_core::batch::summarize_files;
use pdfops_core::{
    parse_request, probe, Engine, EngineConfig, EncryptionProbe, InputFile, ProcessResult,
    RenderingContext,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdfops")]
#[command(about = "Crop, rotate, merge, split, stamp and repair PDF files")]
struct Args {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one operation request
    Run {
        /// Request JSON, or a path to a file containing it
        #[arg(short, long)]
        request: String,

        /// Output file, or a directory to place the artifact in
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the JSON result envelope instead of writing a file
        #[arg(long)]
        json: bool,

        /// Input files, in request order
        files: Vec<PathBuf>,
    },
    /// Report page counts and encryption for each file
    Inspect { files: Vec<PathBuf> },
    /// Classify one file as readable, encrypted or corrupt
    Probe { file: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so `--json` output stays machine readable
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Run {
            request,
            output,
            json,
            files,
        } => run(config, &request, output.as_deref(), json, &files),
        Command::Inspect { files } => {
            let inputs = read_inputs(&files)?;
            let summaries = summarize_files(&inputs, &config);
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            Ok(())
        }
        Command::Probe { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match probe(&bytes) {
                EncryptionProbe::Readable => println!("readable"),
                EncryptionProbe::Encrypted => println!("encrypted"),
                EncryptionProbe::Corrupt(reason) => println!("corrupt: {}", reason),
            }
            Ok(())
        }
    }
}

fn run(
    config: EngineConfig,
    request: &str,
    output: Option<&Path>,
    json: bool,
    files: &[PathBuf],
) -> Result<()> {
    let request = load_request(request)?;
    let operation = parse_request(&request)?;
    let inputs = read_inputs(files)?;
    let engine = Engine::new(config, rendering_context());

    let outcome = engine.execute(&operation, &inputs);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ProcessResult::from_outcome(&outcome))?
        );
        return Ok(());
    }

    let artifact = outcome?;
    for warning in &artifact.warnings {
        warn!("{}", warning);
    }
    let target = output_path(output, &artifact.file_name);
    std::fs::write(&target, &artifact.bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!(
        path = %target.display(),
        bytes = artifact.bytes.len(),
        ms = artifact.metrics.processing_time_ms,
        "wrote {}",
        operation.name()
    );
    Ok(())
}

/// Inline JSON is anything that starts with `{`; everything else is a path.
fn load_request(request: &str) -> Result<String> {
    if request.trim_start().starts_with('{') {
        return Ok(request.to_string());
    }
    std::fs::read_to_string(request).with_context(|| format!("Failed to read request {}", request))
}

fn read_inputs(paths: &[PathBuf]) -> Result<Vec<InputFile>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => bail!("{} is not a file", path.display()),
            };
            Ok(InputFile::new(name, bytes))
        })
        .collect()
}

fn output_path(output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(file_name),
    }
}

#[cfg(feature = "pdfium")]
fn rendering_context() -> RenderingContext {
    RenderingContext::pdfium().unwrap_or_else(|err| {
        warn!(error = %err, "pdfium unavailable; raster repair is disabled");
        RenderingContext::unavailable()
    })
}

#[cfg(not(feature = "pdfium"))]
fn rendering_context() -> RenderingContext {
    RenderingContext::unavailable()
}
