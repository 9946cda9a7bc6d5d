//! Framereel binary - extract frames from one video and store them locally.
//!
//! Usage: `framereel <source-locator> <output-folder> [fps] [max-frames] [quality]`
//!
//! It wires up:
//! - Local filesystem storage for frames and sources
//! - HTTP / file source fetching
//! - Both frame samplers (picked per job, `FRAMEREEL_SAMPLER`)

use framereel::adapters::{FsStorage, HttpFetcher, LocatorFetcher};
use framereel::application::PipelineController;
use framereel::config::AppConfig;
use framereel::domain::av::{FfmpegCli, MediaSampler};
use framereel::domain::jobs::{JobRequest, JobStatus};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: framereel <source-locator> <output-folder> [fps] [max-frames] [quality]";

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` may carry RUST_LOG, and config parsing logs malformed values,
    // so the subscriber sits between the two.
    dotenv::dotenv().ok();
    init_tracing();
    let config = AppConfig::from_env();

    let request = match parse_args(std::env::args().skip(1).collect(), &config) {
        Ok(request) => request,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            return ExitCode::from(2);
        }
    };

    // 1. Adapters
    let storage = match &config.storage_base_url {
        Some(base_url) => FsStorage::with_base_url(&config.storage_dir, base_url),
        None => FsStorage::new(&config.storage_dir),
    };
    let http = match HttpFetcher::new(config.fetch_timeout) {
        Ok(http) => http,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let fetcher = LocatorFetcher::new(http);
    let sampler = MediaSampler::new(FfmpegCli::new(&config.ffmpeg_bin));

    // 2. Application service
    let controller =
        PipelineController::new(storage, fetcher, sampler, config.pipeline_settings());

    // 3. Ctrl-C cancels the running job; cleanup still happens
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling job");
                cancel.cancel();
            }
        }
    });

    match controller.run(request, cancel).await {
        Ok(outcome) => {
            match serde_json::to_string_pretty(&outcome) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to encode outcome: {}", e),
            }
            if outcome.status == JobStatus::Failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(failure) => {
            let report = serde_json::json!({
                "job_id": failure.job_id,
                "status": "failed",
                "stage": failure.stage.to_string(),
                "error": failure.error.to_string(),
                "source_deleted": failure.source_deleted,
                "cleanup_errors": failure.cleanup_errors,
                "frame_urls": failure.frame_urls,
            });
            println!("{:#}", report);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn parse_args(args: Vec<String>, config: &AppConfig) -> Result<JobRequest, String> {
    let mut args = args.into_iter();
    let source_locator = args.next().ok_or("missing source locator")?;
    let output_folder = args.next().ok_or("missing output folder")?;

    let fps = match args.next() {
        Some(raw) => raw.parse().map_err(|_| format!("invalid fps {:?}", raw))?,
        None => config.default_fps,
    };
    let max_frames = match args.next() {
        Some(raw) => raw.parse().map_err(|_| format!("invalid max frames {:?}", raw))?,
        None => config.default_max_frames,
    };
    let quality = match args.next() {
        Some(raw) => raw.parse().map_err(|_| format!("invalid quality {:?}", raw))?,
        None => config.default_quality,
    };
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument {:?}", extra));
    }

    Ok(JobRequest {
        source_locator,
        output_folder,
        fps,
        max_frames,
        quality,
        strategy: Some(config.sampler),
        format: None,
        prefix: None,
    })
}
