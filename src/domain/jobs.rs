use super::error::{CleanupError, PipelineError};
use super::state::JobState;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which sampler implementation extracts the frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Run the `ffmpeg` executable and collect its numbered output files.
    #[default]
    DecodePipe,
    /// Seek through the video with the FFmpeg libraries, one frame at a time.
    SeekSample,
}

impl std::str::FromStr for SamplerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "decode_pipe" | "pipe" => Ok(SamplerKind::DecodePipe),
            "seek_sample" | "seek" => Ok(SamplerKind::SeekSample),
            other => Err(format!("unknown sampler {:?}", other)),
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerKind::DecodePipe => write!(f, "decode_pipe"),
            SamplerKind::SeekSample => write!(f, "seek_sample"),
        }
    }
}

/// Still-image encoding of produced frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    #[default]
    Jpeg,
    Png,
}

impl FrameFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "image/jpeg",
            FrameFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Png => "png",
        }
    }
}

pub const DEFAULT_FRAME_PREFIX: &str = "frame";

/// What a caller submits to start a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub source_locator: String,
    pub output_folder: String,
    pub fps: f64,
    pub max_frames: u32,
    pub quality: f64,
    #[serde(default)]
    pub strategy: Option<SamplerKind>,
    #[serde(default)]
    pub format: Option<FrameFormat>,
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Validated, per-job extraction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub fps: f64,
    pub max_frames: u32,
    /// 0.0 (smallest output) to 1.0 (best quality).
    pub quality: f64,
    pub output_folder: String,
    pub prefix: String,
    pub format: FrameFormat,
    pub strategy: SamplerKind,
}

impl ExtractionConfig {
    pub fn from_request(
        request: &JobRequest,
        default_strategy: SamplerKind,
    ) -> Result<Self, PipelineError> {
        if !request.fps.is_finite() || request.fps <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "fps must be a positive number, got {}",
                request.fps
            )));
        }
        if request.max_frames == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_frames must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&request.quality) {
            return Err(PipelineError::InvalidConfig(format!(
                "quality must be within 0..=1, got {}",
                request.quality
            )));
        }

        let prefix = request
            .prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_FRAME_PREFIX);
        if prefix.contains('/') {
            return Err(PipelineError::InvalidConfig(format!(
                "prefix must not contain '/', got {:?}",
                prefix
            )));
        }

        Ok(Self {
            fps: request.fps,
            max_frames: request.max_frames,
            quality: request.quality,
            output_folder: request.output_folder.trim_matches('/').to_string(),
            prefix: prefix.to_string(),
            format: request.format.unwrap_or_default(),
            strategy: request.strategy.unwrap_or(default_strategy),
        })
    }

    /// Storage key of the frame with the given ordinal.
    pub fn frame_key(&self, ordinal: u32) -> String {
        let name = format!("{}_{:05}.{}", self.prefix, ordinal, self.format.extension());
        if self.output_folder.is_empty() {
            name
        } else {
            format!("{}/{}", self.output_folder, name)
        }
    }
}

/// The source video once it has been fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaAsset {
    pub locator: String,
    pub size: u64,
    pub mime_type: String,
}

/// One extracted still image.
#[derive(Clone, PartialEq)]
pub struct Frame {
    pub ordinal: u32,
    /// Seconds into the source.
    pub timestamp: f64,
    pub bytes: Vec<u8>,
    pub format: FrameFormat,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("ordinal", &self.ordinal)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.bytes.len())
            .field("format", &self.format)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub ordinal: u32,
    pub success: bool,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn uploaded(ordinal: u32, url: String) -> Self {
        Self {
            ordinal,
            success: true,
            url: Some(url),
            error: None,
        }
    }

    pub fn failed(ordinal: u32, error: impl Into<String>) -> Self {
        Self {
            ordinal,
            success: false,
            url: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => JobStatus::Success,
            (0, _) => JobStatus::Failed,
            _ => JobStatus::Partial,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Partial => write!(f, "partial"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal report of a job that got past sampling.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_frames: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successful frame URLs, in ordinal order.
    pub frame_urls: Vec<String>,
    pub results: Vec<UploadResult>,
    pub source_size: u64,
    pub source_deleted: bool,
    pub cleanup_errors: Vec<String>,
}

impl JobOutcome {
    pub fn new(
        job_id: Uuid,
        mut results: Vec<UploadResult>,
        source_size: u64,
        source_deleted: bool,
        cleanup_errors: &[CleanupError],
    ) -> Self {
        results.sort_by_key(|r| r.ordinal);
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let frame_urls = results.iter().filter_map(|r| r.url.clone()).collect();

        Self {
            job_id,
            status: JobStatus::from_counts(succeeded, failed),
            total_frames: results.len(),
            succeeded,
            failed,
            frame_urls,
            results,
            source_size,
            source_deleted,
            cleanup_errors: cleanup_errors.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Report for a job that never produced usable output.
#[derive(Debug, thiserror::Error)]
#[error("job {job_id} failed while {stage}: {error}")]
pub struct JobFailure {
    pub job_id: Uuid,
    pub stage: JobState,
    #[source]
    pub error: PipelineError,
    pub source_deleted: bool,
    pub cleanup_errors: Vec<String>,
    /// Frames already stored when the job stopped. Nothing removes them.
    pub frame_urls: Vec<String>,
}
