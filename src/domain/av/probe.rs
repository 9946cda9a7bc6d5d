use crate::domain::error::SampleError;
use ffmpeg_next as ffmpeg;
use std::path::Path;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Duration in seconds of an already opened container.
///
/// Falls back to the best video stream's own duration when the container
/// does not carry one.
pub(crate) fn container_duration(ictx: &ffmpeg::format::context::Input) -> Result<f64, SampleError> {
    let container = ictx.duration();
    if container >= 0 {
        return Ok(container as f64 / MICROS_PER_SECOND);
    }

    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| SampleError::Decode("no video stream found".to_string()))?;
    let stream_duration = stream.duration();
    if stream_duration >= 0 {
        return Ok(pts_to_seconds(stream_duration, stream.time_base()));
    }

    Err(SampleError::Decode(
        "container does not report a duration".to_string(),
    ))
}

pub(crate) fn pts_to_seconds(pts: i64, time_base: ffmpeg::Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Open `path` and read its duration. Runs on a blocking thread.
pub async fn probe_duration(path: &Path) -> Result<f64, SampleError> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<f64, SampleError> {
        ffmpeg::init()?;
        let ictx = ffmpeg::format::input(&path)
            .map_err(|e| SampleError::Decode(format!("cannot open {:?}: {}", path, e)))?;
        if ictx.streams().best(ffmpeg::media::Type::Video).is_none() {
            return Err(SampleError::Decode("no video stream found".to_string()));
        }
        container_duration(&ictx)
    })
    .await
    .map_err(|e| SampleError::Decode(format!("probe task failed: {}", e)))?
}
