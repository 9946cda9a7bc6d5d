use crate::domain::error::FetchError;
use crate::domain::jobs::MediaAsset;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A source video that now lives in the job workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub asset: MediaAsset,
    pub path: PathBuf,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Copy the video behind `locator` into exactly one file under
    /// `workspace`. Never retries.
    async fn fetch(&self, locator: &str, workspace: &Path) -> Result<FetchedSource, FetchError>;
}
