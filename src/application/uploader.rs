use crate::domain::jobs::{ExtractionConfig, Frame, UploadResult};
use crate::ports::storage::StoragePort;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Cancellation hit mid-upload. `completed` lists, in frame order, the
/// uploads that had already finished.
#[derive(Debug, thiserror::Error)]
#[error("upload cancelled after {} of {} frames", .completed.len(), .total)]
pub struct UploadCancelled {
    pub completed: Vec<UploadResult>,
    pub total: usize,
}

impl UploadCancelled {
    /// URLs of frames that reached storage before the cancellation.
    pub fn stored_urls(&self) -> Vec<String> {
        self.completed.iter().filter_map(|r| r.url.clone()).collect()
    }
}

/// Pushes frames to storage with bounded concurrency. A failed frame is
/// recorded in its result and never stops the others.
pub struct ArtifactUploader<'a, S: ?Sized> {
    storage: &'a S,
    concurrency: usize,
}

impl<'a, S> ArtifactUploader<'a, S>
where
    S: StoragePort + ?Sized,
{
    pub fn new(storage: &'a S, concurrency: usize) -> Self {
        Self {
            storage,
            concurrency: concurrency.max(1),
        }
    }

    /// Results come back in the order of `frames`, whatever order the
    /// uploads finish in.
    pub async fn upload_all(
        &self,
        frames: Vec<Frame>,
        config: &ExtractionConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<UploadResult>, UploadCancelled> {
        let total = frames.len();
        let mut slots: Vec<Option<UploadResult>> = vec![None; total];

        let mut uploads = stream::iter(frames.into_iter().enumerate())
            .map(|(slot, frame)| async move { (slot, self.upload_one(frame, config).await) })
            .buffer_unordered(self.concurrency);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let completed: Vec<UploadResult> = slots.into_iter().flatten().collect();
                    tracing::warn!(completed = completed.len(), total, "upload cancelled");
                    return Err(UploadCancelled { completed, total });
                }
                next = uploads.next() => match next {
                    Some((slot, result)) => slots[slot] = Some(result),
                    None => break,
                },
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    async fn upload_one(&self, frame: Frame, config: &ExtractionConfig) -> UploadResult {
        let key = config.frame_key(frame.ordinal);
        let content_type = frame.format.content_type();

        match self.storage.put(&key, frame.bytes, content_type).await {
            Ok(url) => {
                tracing::debug!(ordinal = frame.ordinal, %url, "frame uploaded");
                UploadResult::uploaded(frame.ordinal, url)
            }
            Err(e) => {
                tracing::warn!(ordinal = frame.ordinal, %key, error = %e, "frame upload failed");
                UploadResult::failed(frame.ordinal, e.to_string())
            }
        }
    }
}
