//! Locator dispatch and the scratch-file conventions shared by fetchers.

use crate::adapters::http::HttpFetcher;
use crate::adapters::local::source::FileFetcher;
use crate::domain::error::FetchError;
use crate::ports::fetcher::{FetchedSource, SourceFetcher};
use async_trait::async_trait;
use std::path::Path;

const SCRATCH_STEM: &str = "source";

/// Name of the single scratch file a fetch writes, keeping a short
/// alphanumeric extension so decoders can use it as a hint.
pub(crate) fn scratch_name(locator_path: &str) -> String {
    match extension_of(locator_path) {
        Some(ext) => format!("{}.{}", SCRATCH_STEM, ext),
        None => SCRATCH_STEM.to_string(),
    }
}

fn extension_of(locator_path: &str) -> Option<String> {
    let ext = Path::new(locator_path).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub(crate) fn guess_mime(locator_path: &str) -> &'static str {
    match extension_of(locator_path).as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Routes `http(s)://` locators to [`HttpFetcher`] and everything else to
/// [`FileFetcher`], which rejects schemes it does not know.
#[derive(Debug, Clone)]
pub struct LocatorFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl LocatorFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            file: FileFetcher,
        }
    }
}

#[async_trait]
impl SourceFetcher for LocatorFetcher {
    async fn fetch(&self, locator: &str, workspace: &Path) -> Result<FetchedSource, FetchError> {
        let lowered = locator.trim_start().to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            self.http.fetch(locator, workspace).await
        } else {
            self.file.fetch(locator, workspace).await
        }
    }
}
