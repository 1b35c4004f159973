//! restora: restore a damaged photograph from the command line.
//!
//! Runs the full request flow (host the original, generate the defect
//! mask, run every stage) and saves the outcome as a numbered JSON
//! record in the output directory.
//!
//! # Usage
//!
//! ```text
//! REPLICATE_API_TOKEN=... IMGBB_API_KEY=... restora [OPTIONS] <INPUT>
//! ```
//!
//! `INPUT` is a local image file or an `http(s)` URL. Service endpoints,
//! polling and output naming come from an optional TOML file
//! (`--config`); API credentials only ever come from the environment or
//! the command line. Log verbosity follows `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use restora_pipeline::memory::{MemoryHost, ScriptedService};
use restora_pipeline::orchestrator::PollSettings;
use restora_pipeline::restore::{RestoreFailure, RestoreSuccess};
use restora_pipeline::{
    ImageRef, ImageSource, ImgbbHost, ObjectHost, PredictionService, ReplicateService,
    RestoraConfig, RestoreRequest, RestoreResponse, Restorer, StageSet, allocate_result_name,
};
use tracing_subscriber::EnvFilter;

/// Restore a damaged photograph through a chain of remote inference jobs.
///
/// Scratches are located locally and inpainted remotely, then the image
/// is denoised, colorized, face-restored and enhanced with depth
/// conditioning.
#[derive(Parser)]
#[command(name = "restora", version)]
struct Cli {
    /// Image to restore: a file path or an http(s) URL.
    input: String,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for result records (overrides the config file).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Which stages to run.
    #[arg(long, value_enum, default_value_t = Stages::Full)]
    stages: Stages,

    /// Pause between job status polls, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up on a job after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Cancel jobs that time out instead of abandoning them.
    #[arg(long)]
    cancel_on_timeout: bool,

    /// Only generate the defect mask and save it as PNG.
    #[arg(long)]
    mask_only: bool,

    /// Run against in-memory fakes instead of the real services.
    #[arg(long)]
    dry_run: bool,

    /// Print the result record as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    /// Inference service API token.
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    replicate_api_token: Option<String>,

    /// Image host API key.
    #[arg(long, env = "IMGBB_API_KEY", hide_env_values = true)]
    imgbb_api_key: Option<String>,
}

/// Stage list selection.
#[derive(Clone, Copy, ValueEnum)]
enum Stages {
    /// Defect removal followed by the five enhancement stages.
    Full,
    /// The five enhancement stages on the original image.
    WithoutDefectRemoval,
}

impl From<Stages> for StageSet {
    fn from(stages: Stages) -> Self {
        match stages {
            Stages::Full => Self::Full,
            Stages::WithoutDefectRemoval => Self::WithoutDefectRemoval,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The config file (or defaults) with command-line overrides applied.
fn effective_config(cli: &Cli) -> Result<RestoraConfig, String> {
    let mut config = match &cli.config {
        Some(path) => RestoraConfig::load_from_path(path).map_err(|e| e.to_string())?,
        None => RestoraConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output.directory.clone_from(dir);
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.polling.interval_ms = ms;
    }
    if let Some(secs) = cli.timeout_secs {
        config.polling.timeout_secs = secs;
    }
    config.polling.cancel_on_timeout |= cli.cancel_on_timeout;
    Ok(config)
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn read_upload(path: &Path) -> Result<ImageSource, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("original.png")
        .to_owned();
    Ok(ImageSource::Upload { bytes, file_name })
}

fn image_source(input: &str) -> Result<ImageSource, String> {
    if is_url(input) {
        Ok(ImageSource::Url(ImageRef::new(input)))
    } else {
        read_upload(Path::new(input))
    }
}

/// Write `contents` under the next free `{prefix}_NNN.{ext}` in `dir`.
fn save_numbered(dir: &Path, prefix: &str, ext: &str, contents: &[u8]) -> Result<PathBuf, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    let name = allocate_result_name(dir, prefix, ext)
        .map_err(|e| format!("Error listing {}: {e}", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    Ok(path)
}

fn run_mask_only(cli: &Cli, config: &RestoraConfig) -> Result<(), String> {
    if is_url(&cli.input) {
        return Err("--mask-only needs a local file".to_owned());
    }
    let bytes = std::fs::read(&cli.input).map_err(|e| format!("Error reading {}: {e}", cli.input))?;
    let mask = restora_mask::generate(&bytes).map_err(|e| format!("Mask error: {e}"))?;
    let png = mask.mask_png().map_err(|e| format!("Mask error: {e}"))?;
    let prefix = format!("{}_mask", config.output.prefix);
    let path = save_numbered(&config.output.directory, &prefix, "png", &png)?;
    tracing::info!(path = %path.display(), "mask saved");

    if cli.json {
        let json = serde_json::to_string_pretty(&mask.diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{json}");
    } else {
        let d = &mask.diagnostics;
        println!("Mask: {}", path.display());
        if let Some(working) = d.working {
            println!("Working size: {}x{}", working.width, working.height);
        }
        println!("Edge pixels: {}", d.edge_pixels);
        println!("Components: {} kept of {}", d.components_kept, d.components_found);
        println!("Mask pixels: {}", d.mask_pixels);
    }
    Ok(())
}

async fn restore_with<S, H>(
    service: S,
    host: H,
    poll: PollSettings,
    request: RestoreRequest,
) -> RestoreResponse
where
    S: PredictionService,
    H: ObjectHost,
{
    Restorer::new(service, host, poll).respond(request).await
}

async fn run_restore(cli: &Cli, config: &RestoraConfig) -> Result<RestoreResponse, String> {
    let request = RestoreRequest {
        source: image_source(&cli.input)?,
        stages: cli.stages.into(),
    };
    let poll = PollSettings::from(&config.polling);

    if cli.dry_run {
        tracing::info!("dry run, using in-memory services");
        if request.stages.needs_mask()
            && let ImageSource::Url(url) = &request.source
        {
            return Err(format!("--dry-run cannot fetch {url}, pass a local file"));
        }
        let response =
            restore_with(ScriptedService::new(), MemoryHost::new(), poll, request).await;
        return Ok(response);
    }

    let token = cli
        .replicate_api_token
        .as_deref()
        .ok_or("REPLICATE_API_TOKEN is not set")?;
    let key = cli
        .imgbb_api_key
        .as_deref()
        .ok_or("IMGBB_API_KEY is not set")?;
    let service = ReplicateService::new(&config.service, token).map_err(|e| e.to_string())?;
    let host = ImgbbHost::new(&config.hosting, key).map_err(|e| e.to_string())?;
    Ok(restore_with(service, host, poll, request).await)
}

fn print_success(success: &RestoreSuccess) {
    println!("Original: {}", success.original);
    if let Some(mask) = &success.mask {
        println!("Mask: {mask}");
    }
    for (stage, output) in &success.outputs {
        println!("{:<20} {output}", stage.as_str());
    }
    println!("Final: {}", success.final_output);
}

fn print_failure(failure: &RestoreFailure) {
    println!("Failed ({}): {}", failure.kind, failure.error);
    if let (Some(stage), Some(index)) = (failure.stage, failure.stage_index) {
        println!("Stage: {index} ({stage})");
    }
    if let Some(job_id) = &failure.job_id {
        println!("Job: {job_id}");
    }
    if let Some(logs) = &failure.logs {
        println!("Logs:\n{logs}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match effective_config(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if cli.mask_only {
        return match run_mask_only(&cli, &config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(msg) => {
                eprintln!("{msg}");
                ExitCode::FAILURE
            }
        };
    }

    let response = match run_restore(&cli, &config).await {
        Ok(response) => response,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let json = match serde_json::to_string_pretty(&response) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error serializing result: {e}");
            return ExitCode::FAILURE;
        }
    };
    match save_numbered(
        &config.output.directory,
        &config.output.prefix,
        "json",
        json.as_bytes(),
    ) {
        Ok(path) => tracing::info!(path = %path.display(), "result saved"),
        Err(msg) => eprintln!("{msg}"),
    }

    if cli.json {
        println!("{json}");
    } else {
        match &response {
            RestoreResponse::Succeeded(success) => print_success(success),
            RestoreResponse::Failed(failure) => print_failure(failure),
        }
    }

    if response.status_code() == 200 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
