//! Which timestamps a job samples.
//!
//! Both samplers share this plan so they agree on frame count and timing:
//! `min(ceil(duration * fps), max_frames)` frames at `i / fps`, with the last
//! sample pulled just below the end of the stream.

/// Margin kept between the last sample and the end of the stream.
pub const END_EPSILON_SECS: f64 = 0.001;

/// Number of frames a `duration`-second source yields at `fps`.
pub fn frame_count(duration: f64, fps: f64, max_frames: u32) -> usize {
    if !duration.is_finite() || duration <= 0.0 || !fps.is_finite() || fps <= 0.0 {
        return 0;
    }
    let wanted = (duration * fps).ceil();
    (wanted as usize).min(max_frames as usize)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplePlan {
    duration: f64,
    timestamps: Vec<f64>,
}

impl SamplePlan {
    pub fn new(duration: f64, fps: f64, max_frames: u32) -> Self {
        let count = frame_count(duration, fps, max_frames);
        let latest = if count == 0 {
            0.0
        } else {
            (duration - END_EPSILON_SECS.min(duration / 2.0)).max(0.0)
        };
        let timestamps = (0..count)
            .map(|i| (i as f64 / fps).min(latest))
            .collect();

        Self {
            duration: if duration.is_finite() { duration.max(0.0) } else { 0.0 },
            timestamps,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Timestamp of the 1-based `ordinal`.
    pub fn timestamp_of(&self, ordinal: u32) -> Option<f64> {
        let index = (ordinal as usize).checked_sub(1)?;
        self.timestamps.get(index).copied()
    }
}
