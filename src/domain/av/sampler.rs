use super::decode_pipe::{DecodePipeSampler, FfmpegCli};
use super::seek::SeekSampler;
use crate::domain::error::SampleError;
use crate::domain::jobs::{ExtractionConfig, Frame, SamplerKind};
use crate::ports::sampler::FrameSampler;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Picks the extraction strategy named by each job's config.
pub struct MediaSampler {
    decode_pipe: DecodePipeSampler<FfmpegCli>,
    seek: SeekSampler,
}

impl MediaSampler {
    pub fn new(ffmpeg: FfmpegCli) -> Self {
        Self {
            decode_pipe: DecodePipeSampler::new(ffmpeg),
            seek: SeekSampler::new(),
        }
    }
}

impl Default for MediaSampler {
    fn default() -> Self {
        Self::new(FfmpegCli::default())
    }
}

#[async_trait]
impl FrameSampler for MediaSampler {
    async fn sample(
        &self,
        source: &Path,
        workspace: &Path,
        config: &ExtractionConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Frame>, SampleError> {
        tracing::debug!(strategy = ?config.strategy, "sampling source");
        match config.strategy {
            SamplerKind::DecodePipe => {
                self.decode_pipe
                    .sample(source, workspace, config, cancel)
                    .await
            }
            SamplerKind::SeekSample => self.seek.sample(source, workspace, config, cancel).await,
        }
    }
}
