use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, LevelFilter};
use serde::Serialize;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use uuid::Uuid;

use stream_uploader::cli::{read_json_argument, Args, Commands};
use stream_uploader::cloud::{upload_to_cloud, CloudUploadRequest};
use stream_uploader::config::{load_or_create_config, PipelineConfig};
use stream_uploader::models::{ProgressFn, UploadDestination};
use stream_uploader::pipeline::create_output_pipe;

/// Printed to stdout once a recording finishes.
#[derive(Serialize)]
struct RecordSummary {
    name: String,
    session: String,
    segments: Vec<String>,
    uploaded_bytes: u64,
    local_file: Option<PathBuf>,
    finished_at: String,
}

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.verbose)?;

    match &args.command {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            PipelineConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
        Commands::Record { name, destination, max_upload_speed } => {
            let config = load_or_create_config(args.config.as_deref())?;
            let name = name.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
            run_record(&name, destination, *max_upload_speed, &config)
        }
        Commands::Upload { request } => {
            let config = load_or_create_config(args.config.as_deref())?;
            run_upload(request, &config)
        }
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    // stdout carries the channel path and the JSON result
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ).context("Failed to initialize logger")?;
    Ok(())
}

fn run_record(
    name: &str,
    destination: &str,
    max_upload_speed: Option<u64>,
    config: &PipelineConfig,
) -> Result<()> {
    let destination = UploadDestination::from_json(&read_json_argument(destination)?)
        .context("Invalid upload destination")?;

    let mut pipe = create_output_pipe(name, &destination, config)
        .context(format!("Failed to create output pipe {}", name))?;
    pipe.set_max_upload_speed(max_upload_speed);

    // The recorder reads the channel path from stdout
    println!("{}", pipe.channel_path().display());

    pipe.start()?;
    pipe.wait().context("Stream did not complete")?;

    let summary = RecordSummary {
        name: name.to_string(),
        session: pipe.session_id(),
        segments: pipe.segment_ids(),
        uploaded_bytes: pipe.uploaded_bytes(),
        local_file: pipe.local_file(),
        finished_at: Utc::now().to_rfc3339(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_upload(request: &str, config: &PipelineConfig) -> Result<()> {
    let request = CloudUploadRequest::from_json(&read_json_argument(request)?)
        .context("Invalid upload request")?;

    let progress: ProgressFn = std::sync::Arc::new(|_, _, total, uploaded| {
        if total > 0 {
            info!("Uploaded {} / {} bytes ({:.1}%)", uploaded, total, uploaded as f64 * 100.0 / total as f64);
        }
    });

    let result = upload_to_cloud(&request, config, Some(progress))
        .context(format!("Upload task {} failed", request.task))?;

    info!("Upload task {} complete: {} bytes", request.task, result.uploaded_bytes);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
