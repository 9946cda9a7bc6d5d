//! Seek-sample strategy.
//!
//! Steps one decode session through the plan's timestamps: seek to the
//! keyframe before `t`, decode forward, keep whichever decoded frame lies
//! nearest to `t`, convert it to RGB and encode it. Seeks on one session are
//! never concurrent, so the whole run happens on a single blocking thread.
//!
//! Plan timestamps count from the first frame. Containers whose stream starts
//! later than zero (MPEG-TS, trimmed MP4) have that offset added before
//! seeking and removed from every decoded frame's time.

use super::encode::encode_rgb;
use super::plan::SamplePlan;
use super::probe::{container_duration, pts_to_seconds};
use crate::domain::error::SampleError;
use crate::domain::jobs::{ExtractionConfig, Frame};
use crate::ports::sampler::FrameSampler;
use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::Video as VideoFrame;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeekSampler;

impl SeekSampler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameSampler for SeekSampler {
    async fn sample(
        &self,
        source: &Path,
        _workspace: &Path,
        config: &ExtractionConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Frame>, SampleError> {
        let source = source.to_path_buf();
        let config = config.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || sample_blocking(source, &config, &cancel))
            .await
            .map_err(|e| SampleError::Decode(format!("seek sampler task failed: {}", e)))?
    }
}

struct DecodeSession {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    /// Presentation time of the stream's first frame, in seconds.
    start_secs: f64,
}

fn sample_blocking(
    source: PathBuf,
    config: &ExtractionConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Frame>, SampleError> {
    ffmpeg::init()?;

    let ictx = ffmpeg::format::input(&source)
        .map_err(|e| SampleError::Decode(format!("cannot open {:?}: {}", source, e)))?;
    let duration = container_duration(&ictx)?;
    let plan = SamplePlan::new(duration, config.fps, config.max_frames);
    if plan.is_empty() {
        tracing::info!(duration, "source has no duration, nothing to sample");
        return Ok(Vec::new());
    }

    let mut session = DecodeSession::open(ictx)?;
    let mut frames = Vec::with_capacity(plan.len());

    for (index, &timestamp) in plan.timestamps().iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(SampleError::Cancelled);
        }

        let image = session.capture_nearest(timestamp)?;
        let bytes = encode_rgb(&image, config.format, config.quality)?;
        let ordinal = index as u32 + 1;
        tracing::debug!(ordinal, timestamp, total = plan.len(), "captured frame");

        frames.push(Frame {
            ordinal,
            timestamp,
            bytes,
            format: config.format,
        });
    }

    if frames.is_empty() {
        return Err(SampleError::EmptyResult {
            duration_secs: duration,
        });
    }
    Ok(frames)
}

impl DecodeSession {
    fn open(ictx: ffmpeg::format::context::Input) -> Result<Self, SampleError> {
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| SampleError::Decode("no video stream found".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_secs = stream_start_seconds(stream.start_time(), time_base);

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_secs,
        })
    }

    /// Decode the frame whose presentation time is closest to `target`.
    fn capture_nearest(&mut self, target: f64) -> Result<RgbImage, SampleError> {
        let position = seek_position(target, self.start_secs);
        self.ictx.seek(position, ..position)?;
        self.decoder.flush();

        let mut before: Option<(f64, VideoFrame)> = None;
        let mut decoded = VideoFrame::empty();

        for (stream, packet) in self.ictx.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder.send_packet(&packet)?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let at = frame_seconds(&decoded, self.time_base, self.start_secs).unwrap_or(target);
                if at >= target {
                    let chosen = pick_nearest(target, before, (at, decoded));
                    return to_rgb(&mut self.scaler, &chosen);
                }
                before = Some((at, decoded.clone()));
            }
        }

        self.decoder.send_eof()?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let at = frame_seconds(&decoded, self.time_base, self.start_secs).unwrap_or(target);
            if at >= target {
                let chosen = pick_nearest(target, before, (at, decoded));
                return to_rgb(&mut self.scaler, &chosen);
            }
            before = Some((at, decoded.clone()));
        }

        match before {
            Some((_, frame)) => to_rgb(&mut self.scaler, &frame),
            None => Err(SampleError::Decode(format!(
                "no decodable frame near {:.3}s",
                target
            ))),
        }
    }
}

/// Unset starts come back from ffmpeg as a large negative sentinel.
fn stream_start_seconds(start: i64, time_base: ffmpeg::Rational) -> f64 {
    if start <= 0 {
        0.0
    } else {
        pts_to_seconds(start, time_base)
    }
}

/// Container seek target in `AV_TIME_BASE` units for a first-frame-relative time.
fn seek_position(target: f64, start_secs: f64) -> i64 {
    ((target + start_secs) * MICROS_PER_SECOND) as i64
}

fn relative_seconds(pts: i64, time_base: ffmpeg::Rational, start_secs: f64) -> f64 {
    pts_to_seconds(pts, time_base) - start_secs
}

fn frame_seconds(frame: &VideoFrame, time_base: ffmpeg::Rational, start_secs: f64) -> Option<f64> {
    frame
        .timestamp()
        .or_else(|| frame.pts())
        .map(|pts| relative_seconds(pts, time_base, start_secs))
}

fn pick_nearest(target: f64, before: Option<(f64, VideoFrame)>, after: (f64, VideoFrame)) -> VideoFrame {
    match before {
        Some((at, frame)) if nearer_before(target, at, after.0) => frame,
        _ => after.1,
    }
}

/// Ties go to the later frame, which is the one at or past `target`.
fn nearer_before(target: f64, before: f64, after: f64) -> bool {
    target - before < after - target
}

fn to_rgb(scaler: &mut ScalingContext, frame: &VideoFrame) -> Result<RgbImage, SampleError> {
    let mut rgb = VideoFrame::empty();
    scaler.run(frame, &mut rgb)?;

    let width = rgb.width();
    let height = rgb.height();
    let stride = rgb.stride(0);
    let row_bytes = width as usize * 3;
    let data = rgb.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| SampleError::Decode("failed to build RGB image from frame".to_string()))
}
