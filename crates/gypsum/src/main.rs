//! gypsum-analyze - submit gypsum images for analysis and print the results.
//!
//! Exit codes:
//!   0 - Every image was analyzed successfully
//!   1 - Runtime error, rejected image, or at least one failed analysis

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};

use gypsum::config::{load_config, load_config_from_str, prepare_runtime, validate_config};
use gypsum::{AnalysisJob, AnalysisService, Artifact, JobStatus, LogFormat};

/// Analyze gypsum sample images with a headless ImageJ/Fiji process
///
/// Examples:
///   gypsum-analyze core-01.png core-02.tif
///   gypsum-analyze --config gypsum.yaml --timeout 120 samples/*.jpg
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, value_name = "FILE", env = "GYPSUM_CONFIG")]
    config: Option<PathBuf>,

    /// Analysis deadline per image, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log level or tracing filter directive
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// How often to check for finished analyses, in milliseconds
    #[arg(long, default_value = "250", value_name = "MS")]
    poll_interval: u64,

    /// Images to analyze
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("gypsum-analyze failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> gypsum::Result<i32> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_config_from_str("")?,
    };
    if let Some(timeout) = args.timeout {
        config.analysis.timeout_secs = timeout;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if args.json_logs {
        config.log_format = LogFormat::Json;
    }
    validate_config(&config)?;

    gypsum::init_logging(&config.log_level, config.log_format)?;
    info!("gypsum-analyze v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    prepare_runtime(&config)?;

    let service = AnalysisService::new(config.analysis.clone());
    let mut job_ids = Vec::with_capacity(args.images.len());
    let mut rejected = 0usize;

    for image in &args.images {
        let artifact = match Artifact::open(image).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(path = %image.display(), "Failed to open image: {}", e);
                rejected += 1;
                continue;
            }
        };

        match service.submit(artifact) {
            Ok(job_id) => job_ids.push(job_id),
            Err(e) => {
                error!(path = %image.display(), "Image rejected: {}", e);
                rejected += 1;
            }
        }
    }

    let interval = Duration::from_millis(args.poll_interval.max(1));
    if wait_for_jobs(&service, &job_ids, interval).await {
        warn!("Interrupted, cancelling running analyses");
    }
    service.shutdown().await;

    let jobs: Vec<AnalysisJob> = job_ids
        .iter()
        .filter_map(|id| service.status(id).ok())
        .collect();
    println!("{}", serde_json::to_string_pretty(&jobs)?);

    let (_, completed, failed) = service.counts();
    info!(completed, failed, rejected, "Analysis run finished");

    let any_failed = rejected > 0 || jobs.iter().any(|job| job.status == JobStatus::Failed);
    Ok(if any_failed { 1 } else { 0 })
}

/// Polls until every job is terminal. Returns true if interrupted by Ctrl-C.
async fn wait_for_jobs(service: &AnalysisService, job_ids: &[String], interval: Duration) -> bool {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let all_done = job_ids.iter().all(|id| {
                    service.status(id).map(|job| job.is_finished()).unwrap_or(true)
                });
                if all_done {
                    return false;
                }
            }
            _ = &mut ctrl_c => return true,
        }
    }
}
