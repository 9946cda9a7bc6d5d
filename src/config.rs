//! Configuration loaded from the environment.

use crate::application::pipeline::PipelineSettings;
use crate::application::uploader::DEFAULT_UPLOAD_CONCURRENCY;
use crate::domain::jobs::SamplerKind;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Parent directory for per-job scratch workspaces
    pub workspace_root: PathBuf,
    /// Directory backing the local frame store
    pub storage_dir: PathBuf,
    /// Public URL prefix for stored frames; `file://` URLs when unset
    pub storage_base_url: Option<String>,
    pub upload_concurrency: usize,
    pub fetch_timeout: Duration,
    pub fetch_retries: u32,
    pub fetch_backoff: Duration,
    /// Path or name of the `ffmpeg` executable
    pub ffmpeg_bin: PathBuf,
    pub default_fps: f64,
    pub default_max_frames: u32,
    pub default_quality: f64,
    pub sampler: SamplerKind,
}

impl AppConfig {
    /// Load configuration from `FRAMEREEL_*` environment variables (and `.env`).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            workspace_root: env::var("FRAMEREEL_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("framereel")),
            storage_dir: env::var("FRAMEREEL_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./frames")),
            storage_base_url: env::var("FRAMEREEL_STORAGE_BASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            upload_concurrency: parse_var(
                "FRAMEREEL_UPLOAD_CONCURRENCY",
                DEFAULT_UPLOAD_CONCURRENCY,
            ),
            fetch_timeout: Duration::from_secs(parse_var("FRAMEREEL_FETCH_TIMEOUT_SECS", 120)),
            fetch_retries: parse_var("FRAMEREEL_FETCH_RETRIES", 2),
            fetch_backoff: Duration::from_millis(parse_var("FRAMEREEL_FETCH_BACKOFF_MS", 250)),
            ffmpeg_bin: env::var("FRAMEREEL_FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            default_fps: parse_var("FRAMEREEL_DEFAULT_FPS", 1.0),
            default_max_frames: parse_var("FRAMEREEL_DEFAULT_MAX_FRAMES", 30),
            default_quality: parse_var("FRAMEREEL_DEFAULT_QUALITY", 0.8),
            sampler: parse_var("FRAMEREEL_SAMPLER", SamplerKind::default()),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            workspace_root: self.workspace_root.clone(),
            upload_concurrency: self.upload_concurrency,
            fetch_retries: self.fetch_retries,
            fetch_backoff: self.fetch_backoff,
            default_strategy: self.sampler,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_or(name, env::var(name).ok().as_deref(), default)
}

/// Unset means default; malformed means default plus a warning.
fn parse_or<T>(name: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(var = name, value = raw, error = %e, %default, "ignoring malformed setting");
            default
        }
    }
}
