//! Decode-pipe strategy.
//!
//! Hands the whole job to the `ffmpeg` executable with an `fps` filter and a
//! numbered output pattern, then recovers the frames by listing what it
//! wrote. The zero-padded ordinal keeps lexicographic and chronological order
//! the same.

use super::encode::ffmpeg_qscale;
use super::plan::SamplePlan;
use super::probe::probe_duration;
use crate::domain::error::SampleError;
use crate::domain::jobs::{ExtractionConfig, Frame, FrameFormat};
use crate::ports::sampler::FrameSampler;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// File stem of every numbered output artifact.
pub const FRAME_STEM: &str = "frame";
const FRAMES_DIR: &str = "frames";
const STDERR_TAIL: usize = 400;

/// One invocation of the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeRequest {
    pub source: PathBuf,
    pub fps: f64,
    pub frame_limit: usize,
    /// `-q:v` value for JPEG output, `None` for lossless formats.
    pub qscale: Option<u8>,
    pub output_pattern: PathBuf,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FfmpegRunner: Send + Sync {
    async fn probe_duration(&self, source: &Path) -> Result<f64, SampleError>;

    /// Write one image per sample into `request.output_pattern`.
    async fn extract_frames(&self, request: &PipeRequest) -> Result<(), SampleError>;
}

/// Runs the system `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegCli {
    bin: PathBuf,
}

impl FfmpegCli {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for FfmpegCli {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl FfmpegRunner for FfmpegCli {
    async fn probe_duration(&self, source: &Path) -> Result<f64, SampleError> {
        probe_duration(source).await
    }

    async fn extract_frames(&self, request: &PipeRequest) -> Result<(), SampleError> {
        let mut command = Command::new(&self.bin);
        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(&request.source)
            .arg("-vf")
            .arg(format!("fps={}", request.fps))
            .arg("-frames:v")
            .arg(request.frame_limit.to_string());
        if let Some(qscale) = request.qscale {
            command.arg("-q:v").arg(qscale.to_string());
        }
        command
            .arg(&request.output_pattern)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = ?command, "spawning ffmpeg");
        let output = command.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .trim()
                .chars()
                .rev()
                .take(STDERR_TAIL)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(SampleError::Decode(format!(
                "ffmpeg exited with {}: {}",
                output.status, tail
            )));
        }
        Ok(())
    }
}

pub struct DecodePipeSampler<R = FfmpegCli> {
    runner: R,
}

impl<R: FfmpegRunner> DecodePipeSampler<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<R: FfmpegRunner> FrameSampler for DecodePipeSampler<R> {
    async fn sample(
        &self,
        source: &Path,
        workspace: &Path,
        config: &ExtractionConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Frame>, SampleError> {
        let duration = self.runner.probe_duration(source).await?;
        let plan = SamplePlan::new(duration, config.fps, config.max_frames);
        if plan.is_empty() {
            tracing::info!(duration, "source has no duration, nothing to sample");
            return Ok(Vec::new());
        }

        let out_dir = workspace.join(FRAMES_DIR);
        tokio::fs::create_dir_all(&out_dir).await?;

        let request = PipeRequest {
            source: source.to_path_buf(),
            fps: config.fps,
            frame_limit: plan.len(),
            qscale: match config.format {
                FrameFormat::Jpeg => Some(ffmpeg_qscale(config.quality)),
                FrameFormat::Png => None,
            },
            output_pattern: out_dir.join(format!(
                "{}_%05d.{}",
                FRAME_STEM,
                config.format.extension()
            )),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SampleError::Cancelled),
            result = self.runner.extract_frames(&request) => result?,
        }

        let frames = collect_frames(&out_dir, &plan, config.format).await?;
        if frames.len() != plan.len() {
            tracing::warn!(
                produced = frames.len(),
                planned = plan.len(),
                "decoder produced a different number of frames than planned"
            );
        }
        Ok(frames)
    }
}

/// Parse `frame_00042.jpg` into `42`.
fn numbered_ordinal(file_name: &str, extension: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(FRAME_STEM)?
        .strip_prefix('_')?
        .strip_suffix(extension)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Read the decoder's numbered artifacts back as frames.
///
/// File `N` is frame `N` at the plan's `N`th timestamp. Files numbered past
/// the plan are ignored. Numbering must run from 1 without gaps; a short
/// tail is accepted but a hole in the middle would misplace every later
/// frame, so it is a decode error.
pub async fn collect_frames(
    dir: &Path,
    plan: &SamplePlan,
    format: FrameFormat,
) -> Result<Vec<Frame>, SampleError> {
    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(number) = numbered_ordinal(name, format.extension()) {
            numbered.push((number, entry.path()));
        }
    }
    numbered.sort_by_key(|(number, _)| *number);
    numbered.retain(|(number, _)| (*number as usize) <= plan.len());

    if numbered.is_empty() {
        return Err(SampleError::EmptyResult {
            duration_secs: plan.duration(),
        });
    }

    let mut frames = Vec::with_capacity(numbered.len());
    for (index, (ordinal, path)) in numbered.into_iter().enumerate() {
        let expected = index as u32 + 1;
        if ordinal != expected {
            return Err(SampleError::Decode(format!(
                "decoder output is missing frame {} (next file is frame {})",
                expected, ordinal
            )));
        }
        let timestamp = plan
            .timestamp_of(ordinal)
            .ok_or_else(|| SampleError::Decode(format!("no sample slot for frame {}", ordinal)))?;
        let bytes = tokio::fs::read(&path).await?;
        tracing::debug!(ordinal, timestamp, path = ?path, "collected frame");

        frames.push(Frame {
            ordinal,
            timestamp,
            bytes,
            format,
        });
    }
    Ok(frames)
}
