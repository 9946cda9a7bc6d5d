//! State machines for a job and for the asset it works on.

use super::jobs::JobStatus;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

/// Stage of a single pipeline run. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "status")]
pub enum JobState {
    Pending,
    Fetching,
    Sampling,
    Uploading,
    Cleaning,
    Done(JobStatus),
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Fetching => 1,
            JobState::Sampling => 2,
            JobState::Uploading => 3,
            JobState::Cleaning => 4,
            JobState::Done(_) => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done(_))
    }

    /// Move to `next`. Skipping ahead is allowed (a fatal error jumps
    /// straight to `Cleaning`), but `Done` is only reachable from `Cleaning`.
    pub fn advance(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        let legal = next.rank() > self.rank()
            && (!next.is_terminal() || *self == JobState::Cleaning);
        if !legal {
            return Err(InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Fetching => write!(f, "fetching"),
            JobState::Sampling => write!(f, "sampling"),
            JobState::Uploading => write!(f, "uploading"),
            JobState::Cleaning => write!(f, "cleaning"),
            JobState::Done(status) => write!(f, "done({})", status),
        }
    }
}

/// Lifecycle of one uploaded asset as seen by the UI. A single enum means a
/// file cannot be both `uploading` and `error` at once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AssetStatus {
    Pending,
    Uploading,
    NeedsTrim { duration_secs: f64, limit_secs: f64 },
    Trimming,
    ProcessingFrames,
    Done { frames: usize },
    Failed { reason: String },
}

impl AssetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Done { .. } | AssetStatus::Failed { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            AssetStatus::Pending => "pending",
            AssetStatus::Uploading => "uploading",
            AssetStatus::NeedsTrim { .. } => "needs_trim",
            AssetStatus::Trimming => "trimming",
            AssetStatus::ProcessingFrames => "processing_frames",
            AssetStatus::Done { .. } => "done",
            AssetStatus::Failed { .. } => "failed",
        }
    }

    pub fn advance(self, next: AssetStatus) -> Result<AssetStatus, InvalidTransition> {
        use AssetStatus::*;

        let legal = match (&self, &next) {
            (Done { .. } | Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (Pending, Uploading | ProcessingFrames) => true,
            (Uploading, NeedsTrim { .. } | ProcessingFrames) => true,
            (NeedsTrim { .. }, Trimming) => true,
            (Trimming, ProcessingFrames) => true,
            (ProcessingFrames, Done { .. }) => true,
            _ => false,
        };

        if legal {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self.name().to_string(),
                to: next.name().to_string(),
            })
        }
    }
}
