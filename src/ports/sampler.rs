use crate::domain::error::SampleError;
use crate::domain::jobs::{ExtractionConfig, Frame};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Decode `source` into frames with ordinals `1..=N` and non-decreasing
    /// timestamps. `workspace` is job-private scratch space.
    async fn sample(
        &self,
        source: &Path,
        workspace: &Path,
        config: &ExtractionConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Frame>, SampleError>;
}
