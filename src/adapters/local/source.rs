use crate::adapters::source::{guess_mime, scratch_name};
use crate::domain::error::FetchError;
use crate::domain::jobs::MediaAsset;
use crate::ports::fetcher::{FetchedSource, SourceFetcher};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Fetches sources that are plain paths or `file://` URLs by copying them
/// into the workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

fn resolve(locator: &str) -> Result<PathBuf, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidLocator {
        locator: locator.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty locator"));
    }
    if trimmed.to_ascii_lowercase().starts_with("file:") {
        let url = reqwest::Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
        return url
            .to_file_path()
            .map_err(|_| invalid("file URL does not name a local path"));
    }
    if trimmed.contains("://") {
        return Err(invalid("unsupported scheme"));
    }
    Ok(PathBuf::from(trimmed))
}

#[async_trait]
impl SourceFetcher for FileFetcher {
    async fn fetch(&self, locator: &str, workspace: &Path) -> Result<FetchedSource, FetchError> {
        let source = resolve(locator)?;
        let metadata = match tokio::fs::metadata(&source).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FetchError::NotFound(locator.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(FetchError::InvalidLocator {
                locator: locator.to_string(),
                reason: "not a regular file".to_string(),
            });
        }

        let source_name = source.to_string_lossy();
        let path = workspace.join(scratch_name(&source_name));
        let size = tokio::fs::copy(&source, &path).await?;
        tracing::debug!(locator, size, path = ?path, "copied local source");

        Ok(FetchedSource {
            asset: MediaAsset {
                locator: locator.to_string(),
                size,
                mime_type: guess_mime(&source_name).to_string(),
            },
            path,
        })
    }
}
