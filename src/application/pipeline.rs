use crate::application::lifecycle::JobLifecycle;
use crate::application::uploader::{ArtifactUploader, DEFAULT_UPLOAD_CONCURRENCY};
use crate::domain::error::{FetchError, PipelineError};
use crate::domain::jobs::{
    ExtractionConfig, Frame, JobFailure, JobOutcome, JobRequest, JobStatus, SamplerKind,
    UploadResult,
};
use crate::domain::state::{AssetStatus, JobState};
use crate::ports::fetcher::{FetchedSource, SourceFetcher};
use crate::ports::sampler::FrameSampler;
use crate::ports::storage::StoragePort;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Parent directory of every job workspace.
    pub workspace_root: PathBuf,
    pub upload_concurrency: usize,
    /// Extra fetch attempts after a retryable failure.
    pub fetch_retries: u32,
    /// Delay before the first retry, doubled on each further one.
    pub fetch_backoff: Duration,
    pub default_strategy: SamplerKind,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("framereel"),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            fetch_retries: 2,
            fetch_backoff: Duration::from_millis(250),
            default_strategy: SamplerKind::default(),
        }
    }
}

/// Runs one job end to end: fetch, sample, upload, clean up.
///
/// Every job gets its own workspace, so one controller can run any number
/// of jobs at once. Whatever happens after the workspace exists, the
/// cleaning stage runs exactly once before `run` returns.
pub struct PipelineController<S, F, M> {
    storage: S,
    fetcher: F,
    sampler: M,
    settings: PipelineSettings,
    status: Option<watch::Sender<AssetStatus>>,
}

impl<S, F, M> PipelineController<S, F, M>
where
    S: StoragePort,
    F: SourceFetcher,
    M: FrameSampler,
{
    pub fn new(storage: S, fetcher: F, sampler: M, settings: PipelineSettings) -> Self {
        Self {
            storage,
            fetcher,
            sampler,
            settings,
            status: None,
        }
    }

    /// Publish the asset's status to `tx` as the job moves along.
    pub fn with_status_channel(mut self, tx: watch::Sender<AssetStatus>) -> Self {
        self.status = Some(tx);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        request: JobRequest,
        cancel: CancellationToken,
    ) -> Result<JobOutcome, JobFailure> {
        let job_id = Uuid::new_v4();
        let span = tracing::info_span!("job", %job_id, source = %request.source_locator);
        self.run_job(job_id, request, cancel).instrument(span).await
    }

    async fn run_job(
        &self,
        job_id: Uuid,
        request: JobRequest,
        cancel: CancellationToken,
    ) -> Result<JobOutcome, JobFailure> {
        let mut state = JobState::Pending;

        let config = match ExtractionConfig::from_request(&request, self.settings.default_strategy)
        {
            Ok(config) => config,
            Err(error) => return Err(self.reject(job_id, state, error)),
        };

        let mut lifecycle = match JobLifecycle::begin(
            &self.settings.workspace_root,
            job_id,
            &request.source_locator,
        ) {
            Ok(lifecycle) => lifecycle,
            Err(e) => return Err(self.reject(job_id, state, PipelineError::Workspace(e))),
        };

        tracing::info!(
            fps = config.fps,
            max_frames = config.max_frames,
            strategy = ?config.strategy,
            folder = %config.output_folder,
            "job started"
        );
        self.publish(AssetStatus::ProcessingFrames);

        let mut stored_urls = Vec::new();
        let result = self
            .execute(
                &mut state,
                &config,
                lifecycle.workspace(),
                &request.source_locator,
                &cancel,
                &mut stored_urls,
            )
            .await;

        let failed_in = state;
        transition(&mut state, JobState::Cleaning);
        let report = lifecycle.cleanup(&self.storage).await;

        match result {
            Ok((results, source_size)) => {
                let outcome = JobOutcome::new(
                    job_id,
                    results,
                    source_size,
                    report.source_deleted,
                    &report.errors,
                );
                transition(&mut state, JobState::Done(outcome.status));
                tracing::info!(
                    status = %outcome.status,
                    total = outcome.total_frames,
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    "job finished"
                );
                if outcome.status == JobStatus::Failed {
                    self.publish(AssetStatus::Failed {
                        reason: "every frame upload failed".to_string(),
                    });
                } else {
                    self.publish(AssetStatus::Done {
                        frames: outcome.succeeded,
                    });
                }
                Ok(outcome)
            }
            Err(error) => {
                transition(&mut state, JobState::Done(JobStatus::Failed));
                tracing::error!(stage = %failed_in, error = %error, "job failed");
                self.publish(AssetStatus::Failed {
                    reason: error.to_string(),
                });
                Err(JobFailure {
                    job_id,
                    stage: failed_in,
                    error,
                    source_deleted: report.source_deleted,
                    cleanup_errors: report.errors.iter().map(ToString::to_string).collect(),
                    frame_urls: stored_urls,
                })
            }
        }
    }

    /// Fetch, sample and upload. Returns the upload results and the source
    /// size. If uploads are cancelled, `stored_urls` receives the frames that
    /// made it to storage first.
    async fn execute(
        &self,
        state: &mut JobState,
        config: &ExtractionConfig,
        workspace: &Path,
        locator: &str,
        cancel: &CancellationToken,
        stored_urls: &mut Vec<String>,
    ) -> Result<(Vec<UploadResult>, u64), PipelineError> {
        transition(state, JobState::Fetching);
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            fetched = self.fetch_with_retry(locator, workspace) => fetched?,
        };
        tracing::info!(
            size = fetched.asset.size,
            mime_type = %fetched.asset.mime_type,
            "source fetched"
        );

        transition(state, JobState::Sampling);
        let frames = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            frames = self.sampler.sample(&fetched.path, workspace, config, cancel) => frames?,
        };
        check_sequence(&frames)?;
        tracing::info!(frames = frames.len(), "sampling finished");

        transition(state, JobState::Uploading);
        let results = match ArtifactUploader::new(&self.storage, self.settings.upload_concurrency)
            .upload_all(frames, config, cancel)
            .await
        {
            Ok(results) => results,
            Err(cancelled) => {
                *stored_urls = cancelled.stored_urls();
                return Err(PipelineError::Cancelled);
            }
        };

        Ok((results, fetched.asset.size))
    }

    async fn fetch_with_retry(
        &self,
        locator: &str,
        workspace: &Path,
    ) -> Result<FetchedSource, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetcher.fetch(locator, workspace).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() && attempt < self.settings.fetch_retries => {
                    let delay = self.settings.fetch_backoff.saturating_mul(1 << attempt.min(16));
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Failure before any resource exists: nothing to clean up.
    fn reject(&self, job_id: Uuid, stage: JobState, error: PipelineError) -> JobFailure {
        tracing::error!(error = %error, "job rejected");
        self.publish(AssetStatus::Failed {
            reason: error.to_string(),
        });
        JobFailure {
            job_id,
            stage,
            error,
            source_deleted: false,
            cleanup_errors: Vec::new(),
            frame_urls: Vec::new(),
        }
    }

    fn publish(&self, next: AssetStatus) {
        let Some(tx) = &self.status else {
            return;
        };
        tx.send_if_modified(|current| match current.clone().advance(next) {
            Ok(status) => {
                *current = status;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "asset status not updated");
                false
            }
        });
    }
}

fn transition(state: &mut JobState, next: JobState) {
    match state.advance(next) {
        Ok(()) => tracing::debug!(state = %next, "job state changed"),
        Err(e) => tracing::error!(error = %e, "job state unchanged"),
    }
}

/// Samplers must hand back ordinals `1..=N` with non-decreasing timestamps.
fn check_sequence(frames: &[Frame]) -> Result<(), PipelineError> {
    let mut last = f64::NEG_INFINITY;
    for (i, frame) in frames.iter().enumerate() {
        if frame.ordinal as usize != i + 1 || frame.timestamp < last {
            return Err(PipelineError::Decode(format!(
                "sampler returned frame {} at {:.3}s out of sequence",
                frame.ordinal, frame.timestamp
            )));
        }
        last = frame.timestamp;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::{FileFetcher, FsStorage};
    use crate::adapters::HttpFetcher;
    use crate::domain::error::SampleError;
    use crate::domain::jobs::{FrameFormat, MediaAsset};
    use crate::ports::fetcher::MockSourceFetcher;
    use crate::ports::sampler::MockFrameSampler;
    use crate::ports::storage::{MockStoragePort, StoredObject};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn settings(root: &TempDir) -> PipelineSettings {
        PipelineSettings {
            workspace_root: root.path().join("work"),
            upload_concurrency: 3,
            fetch_retries: 2,
            fetch_backoff: Duration::from_millis(1),
            default_strategy: SamplerKind::DecodePipe,
        }
    }

    fn request(locator: &str) -> JobRequest {
        JobRequest {
            source_locator: locator.to_string(),
            output_folder: "jobs/1".to_string(),
            fps: 1.0,
            max_frames: 10,
            quality: 0.8,
            strategy: None,
            format: None,
            prefix: None,
        }
    }

    fn frames(n: u32) -> Vec<Frame> {
        (1..=n)
            .map(|ordinal| Frame {
                ordinal,
                timestamp: f64::from(ordinal - 1),
                bytes: vec![0xd8; 16],
                format: FrameFormat::Jpeg,
            })
            .collect()
    }

    fn workspaces_left(root: &TempDir) -> usize {
        match std::fs::read_dir(root.path().join("work")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    /// Fetcher that writes a small scratch file, like the real ones do.
    fn writing_fetcher(times: usize) -> MockSourceFetcher {
        let mut fetcher = MockSourceFetcher::new();
        fetcher
            .expect_fetch()
            .times(times)
            .returning(|locator, workspace| {
                let path = workspace.join("source.mp4");
                std::fs::write(&path, b"fake video").unwrap();
                Ok(FetchedSource {
                    asset: MediaAsset {
                        locator: locator.to_string(),
                        size: 10,
                        mime_type: "video/mp4".to_string(),
                    },
                    path,
                })
            });
        fetcher
    }

    fn sampler_returning(n: u32) -> MockFrameSampler {
        let mut sampler = MockFrameSampler::new();
        sampler
            .expect_sample()
            .times(1)
            .returning(move |source, workspace, _, _| {
                assert!(workspace.is_dir());
                assert!(source.starts_with(workspace));
                Ok(frames(n))
            });
        sampler
    }

    fn failing_sampler(error: fn() -> SampleError) -> MockFrameSampler {
        let mut sampler = MockFrameSampler::new();
        sampler
            .expect_sample()
            .times(1)
            .returning(move |_, _, _, _| Err(error()));
        sampler
    }

    fn accepting_storage(puts: usize, deletes: usize) -> MockStoragePort {
        let mut storage = MockStoragePort::new();
        storage
            .expect_put()
            .times(puts)
            .returning(|key, _, _| Ok(format!("https://cdn.test/{}", key)));
        storage.expect_delete().times(deletes).returning(|_| Ok(()));
        storage
    }

    #[tokio::test]
    async fn test_end_to_end_with_local_storage() {
        let root = tempdir().unwrap();
        let storage = FsStorage::new(root.path().join("store"));
        let source_url = storage
            .put("uploads/clip.mp4", b"fake video".to_vec(), "video/mp4")
            .await
            .unwrap();

        let controller =
            PipelineController::new(storage, FileFetcher, sampler_returning(3), settings(&root));
        let outcome = controller
            .run(request(&source_url), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Success);
        assert_eq!(outcome.total_frames, 3);
        assert_eq!(outcome.source_size, 10);
        assert!(outcome.source_deleted);
        assert!(outcome.frame_urls[0].ends_with("/jobs/1/frame_00001.jpg"));
        assert!(outcome.frame_urls[2].ends_with("/jobs/1/frame_00003.jpg"));

        let keys: Vec<String> = controller
            .storage()
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "jobs/1/frame_00001.jpg",
                "jobs/1/frame_00002.jpg",
                "jobs/1/frame_00003.jpg"
            ]
        );
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_zero_frames_is_success_without_uploads() {
        let root = tempdir().unwrap();
        let controller = PipelineController::new(
            accepting_storage(0, 1),
            writing_fetcher(1),
            sampler_returning(0),
            settings(&root),
        );
        let outcome = controller
            .run(request("uploads/empty.mp4"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Success);
        assert_eq!(outcome.total_frames, 0);
        assert!(outcome.frame_urls.is_empty());
        assert!(outcome.source_deleted);
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_missing_source_fails_in_fetching() {
        let root = tempdir().unwrap();
        let mut fetcher = MockSourceFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, _| Err(FetchError::Status { status: 404 }));
        let mut sampler = MockFrameSampler::new();
        sampler.expect_sample().times(0);

        let controller =
            PipelineController::new(accepting_storage(0, 1), fetcher, sampler, settings(&root));
        let failure = controller
            .run(request("https://cdn.test/gone.mp4"), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.stage, JobState::Fetching);
        assert!(matches!(
            failure.error,
            PipelineError::Fetch(FetchError::Status { status: 404 })
        ));
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_http_not_found_skips_sampling_and_uploads() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, axum::Router::new()).await.unwrap();
        });

        let root = tempdir().unwrap();
        let mut sampler = MockFrameSampler::new();
        sampler.expect_sample().times(0);
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let controller =
            PipelineController::new(accepting_storage(0, 1), fetcher, sampler, settings(&root));
        let failure = controller
            .run(
                request(&format!("http://{}/uploads/missing.mp4", addr)),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.stage, JobState::Fetching);
        assert!(matches!(
            failure.error,
            PipelineError::Fetch(FetchError::Status { status: 404 })
        ));
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_partial_upload_failure() {
        let root = tempdir().unwrap();
        let mut storage = MockStoragePort::new();
        storage.expect_put().times(10).returning(|key, _, _| {
            if key.ends_with("_00003.jpg") || key.ends_with("_00008.jpg") {
                Err("503 from bucket".into())
            } else {
                Ok(format!("https://cdn.test/{}", key))
            }
        });
        storage
            .expect_delete()
            .withf(|locator| locator.to_string() == "uploads/long.mp4")
            .times(1)
            .returning(|_| Ok(()));

        let controller = PipelineController::new(
            storage,
            writing_fetcher(1),
            sampler_returning(10),
            settings(&root),
        );
        let outcome = controller
            .run(request("uploads/long.mp4"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Partial);
        assert_eq!(outcome.total_frames, 10);
        assert_eq!(outcome.succeeded, 8);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.succeeded + outcome.failed, outcome.total_frames);
        assert_eq!(outcome.frame_urls.len(), 8);
        assert!(outcome.frame_urls[2].ends_with("_00004.jpg"));
        let failed: Vec<u32> = outcome
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.ordinal)
            .collect();
        assert_eq!(failed, vec![3, 8]);
        assert!(outcome.source_deleted);
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_all_uploads_failing_is_failed_outcome() {
        let root = tempdir().unwrap();
        let mut storage = MockStoragePort::new();
        storage
            .expect_put()
            .times(4)
            .returning(|_, _, _| Err("bucket offline".into()));
        storage.expect_delete().times(1).returning(|_| Ok(()));

        let controller = PipelineController::new(
            storage,
            writing_fetcher(1),
            sampler_returning(4),
            settings(&root),
        );
        let outcome = controller
            .run(request("uploads/clip.mp4"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.failed, 4);
        assert!(outcome.frame_urls.is_empty());
    }

    #[tokio::test]
    async fn test_decode_error_skips_uploads() {
        let root = tempdir().unwrap();
        let controller = PipelineController::new(
            accepting_storage(0, 1),
            writing_fetcher(1),
            failing_sampler(|| SampleError::Decode("moov atom not found".to_string())),
            settings(&root),
        );
        let failure = controller
            .run(request("uploads/broken.mp4"), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.stage, JobState::Sampling);
        assert!(matches!(failure.error, PipelineError::Decode(_)));
        assert!(failure.source_deleted);
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_empty_result_is_fatal() {
        let root = tempdir().unwrap();
        let controller = PipelineController::new(
            accepting_storage(0, 1),
            writing_fetcher(1),
            failing_sampler(|| SampleError::EmptyResult { duration_secs: 4.0 }),
            settings(&root),
        );
        let failure = controller
            .run(request("uploads/odd.mp4"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::EmptyResult { .. }));
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_retryable_fetch_error_is_retried() {
        let root = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut fetcher = MockSourceFetcher::new();
        fetcher.expect_fetch().returning(move |locator, workspace| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(FetchError::Status { status: 503 });
            }
            let path = workspace.join("source.mp4");
            std::fs::write(&path, b"video").unwrap();
            Ok(FetchedSource {
                asset: MediaAsset {
                    locator: locator.to_string(),
                    size: 5,
                    mime_type: "video/mp4".to_string(),
                },
                path,
            })
        });

        let controller = PipelineController::new(
            accepting_storage(2, 1),
            fetcher,
            sampler_returning(2),
            settings(&root),
        );
        let outcome = controller
            .run(request("https://cdn.test/flaky.mp4"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let root = tempdir().unwrap();
        let mut fetcher = MockSourceFetcher::new();
        fetcher
            .expect_fetch()
            .times(3)
            .returning(|_, _| Err(FetchError::Timeout));
        let mut sampler = MockFrameSampler::new();
        sampler.expect_sample().times(0);

        let controller =
            PipelineController::new(accepting_storage(0, 1), fetcher, sampler, settings(&root));
        let failure = controller
            .run(request("https://cdn.test/slow.mp4"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            PipelineError::Fetch(FetchError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_job_still_cleans_up() {
        let root = tempdir().unwrap();
        let mut fetcher = MockSourceFetcher::new();
        fetcher.expect_fetch().times(0);
        let mut sampler = MockFrameSampler::new();
        sampler.expect_sample().times(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let controller =
            PipelineController::new(accepting_storage(0, 1), fetcher, sampler, settings(&root));
        let failure = controller
            .run(request("uploads/clip.mp4"), cancel)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, JobState::Fetching);
        assert!(matches!(failure.error, PipelineError::Cancelled));
        assert!(failure.source_deleted);
        assert_eq!(workspaces_left(&root), 0);
    }

    /// Stores frame 1 at once, cancels the job while storing frame 2 and
    /// never finishes the others in time.
    struct CancellingStorage {
        cancel: CancellationToken,
        deletes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StoragePort for CancellingStorage {
        async fn put(
            &self,
            key: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            if key.ends_with("_00001.jpg") {
                return Ok(format!("https://cdn.test/{}", key));
            }
            if key.ends_with("_00002.jpg") {
                self.cancel.cancel();
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(format!("https://cdn.test/{}", key))
        }

        async fn delete(&self, _url: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn list(
            &self,
        ) -> Result<Vec<StoredObject>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_upload_reports_stored_frames() {
        let root = tempdir().unwrap();
        let cancel = CancellationToken::new();
        let storage = CancellingStorage {
            cancel: cancel.clone(),
            deletes: AtomicUsize::new(0),
        };

        let controller = PipelineController::new(
            storage,
            writing_fetcher(1),
            sampler_returning(10),
            settings(&root),
        );
        let failure = controller
            .run(request("uploads/clip.mp4"), cancel)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, JobState::Uploading);
        assert!(matches!(failure.error, PipelineError::Cancelled));
        assert_eq!(
            failure.frame_urls,
            vec!["https://cdn.test/jobs/1/frame_00001.jpg"]
        );
        assert!(failure.source_deleted);
        assert_eq!(controller.storage().deletes.load(Ordering::SeqCst), 1);
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_plain_path_source_never_deletes_a_stored_blob() {
        let root = tempdir().unwrap();
        let storage = FsStorage::new(root.path().join("store"));
        storage
            .put("clip.mp4", b"someone else's upload".to_vec(), "video/mp4")
            .await
            .unwrap();

        let controller = PipelineController::new(
            storage,
            writing_fetcher(1),
            sampler_returning(2),
            settings(&root),
        );
        let outcome = controller
            .run(request("clip.mp4"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Success);
        assert!(!outcome.source_deleted);
        assert_eq!(outcome.cleanup_errors.len(), 1);
        assert!(outcome.cleanup_errors[0].contains("not an object of this store"));
        assert!(root.path().join("store/clip.mp4").exists());
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_touches_nothing() {
        let root = tempdir().unwrap();
        let mut fetcher = MockSourceFetcher::new();
        fetcher.expect_fetch().times(0);
        let mut sampler = MockFrameSampler::new();
        sampler.expect_sample().times(0);

        let controller =
            PipelineController::new(accepting_storage(0, 0), fetcher, sampler, settings(&root));
        let mut bad = request("uploads/clip.mp4");
        bad.fps = 0.0;
        let failure = controller
            .run(bad, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.stage, JobState::Pending);
        assert!(matches!(failure.error, PipelineError::InvalidConfig(_)));
        assert!(!failure.source_deleted);
        assert!(!root.path().join("work").exists());
    }

    #[tokio::test]
    async fn test_source_delete_failure_keeps_outcome() {
        let root = tempdir().unwrap();
        let mut storage = MockStoragePort::new();
        storage
            .expect_put()
            .times(2)
            .returning(|key, _, _| Ok(format!("https://cdn.test/{}", key)));
        storage
            .expect_delete()
            .times(1)
            .returning(|_| Err("access denied".into()));

        let controller = PipelineController::new(
            storage,
            writing_fetcher(1),
            sampler_returning(2),
            settings(&root),
        );
        let outcome = controller
            .run(request("uploads/clip.mp4"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Success);
        assert!(!outcome.source_deleted);
        assert_eq!(outcome.cleanup_errors.len(), 1);
        assert!(outcome.cleanup_errors[0].contains("access denied"));
    }

    #[tokio::test]
    async fn test_out_of_sequence_frames_are_rejected() {
        let root = tempdir().unwrap();
        let mut sampler = MockFrameSampler::new();
        sampler.expect_sample().times(1).returning(|_, _, _, _| {
            let mut frames = frames(3);
            frames.swap(0, 2);
            Ok(frames)
        });

        let controller = PipelineController::new(
            accepting_storage(0, 1),
            writing_fetcher(1),
            sampler,
            settings(&root),
        );
        let failure = controller
            .run(request("uploads/clip.mp4"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::Decode(_)));
    }

    #[tokio::test]
    async fn test_panicking_sampler_leaves_no_workspace() {
        struct PanickingSampler;

        #[async_trait::async_trait]
        impl FrameSampler for PanickingSampler {
            async fn sample(
                &self,
                _source: &Path,
                _workspace: &Path,
                _config: &ExtractionConfig,
                _cancel: &CancellationToken,
            ) -> Result<Vec<Frame>, SampleError> {
                panic!("decoder blew up")
            }
        }

        let root = tempdir().unwrap();
        let controller = Arc::new(PipelineController::new(
            accepting_storage(0, 0),
            writing_fetcher(1),
            PanickingSampler,
            settings(&root),
        ));
        let task = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .run(request("uploads/clip.mp4"), CancellationToken::new())
                    .await
            }
        });

        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_use_separate_workspaces() {
        let root = tempdir().unwrap();
        let mut sampler = MockFrameSampler::new();
        sampler
            .expect_sample()
            .times(2)
            .returning(|_, workspace, _, _| {
                assert_eq!(std::fs::read_dir(workspace).unwrap().count(), 1);
                Ok(frames(2))
            });

        let controller = PipelineController::new(
            accepting_storage(4, 2),
            writing_fetcher(2),
            sampler,
            settings(&root),
        );
        let (a, b) = tokio::join!(
            controller.run(request("uploads/a.mp4"), CancellationToken::new()),
            controller.run(request("uploads/b.mp4"), CancellationToken::new()),
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(workspaces_left(&root), 0);
    }

    #[tokio::test]
    async fn test_status_channel_reports_done() {
        let root = tempdir().unwrap();
        let (tx, rx) = watch::channel(AssetStatus::Uploading);
        let controller = PipelineController::new(
            accepting_storage(3, 1),
            writing_fetcher(1),
            sampler_returning(3),
            settings(&root),
        )
        .with_status_channel(tx);

        controller
            .run(request("uploads/clip.mp4"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*rx.borrow(), AssetStatus::Done { frames: 3 });
    }

    #[tokio::test]
    async fn test_status_channel_reports_failure() {
        let root = tempdir().unwrap();
        let (tx, rx) = watch::channel(AssetStatus::Pending);
        let controller = PipelineController::new(
            accepting_storage(0, 1),
            writing_fetcher(1),
            failing_sampler(|| SampleError::Decode("bad stream".to_string())),
            settings(&root),
        )
        .with_status_channel(tx);

        controller
            .run(request("uploads/clip.mp4"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(*rx.borrow(), AssetStatus::Failed { .. }));
    }

    #[test]
    fn test_check_sequence() {
        assert!(check_sequence(&frames(4)).is_ok());
        assert!(check_sequence(&[]).is_ok());
        let mut gap = frames(3);
        gap.remove(1);
        assert!(check_sequence(&gap).is_err());
    }
}
