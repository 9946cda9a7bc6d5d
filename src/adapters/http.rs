use crate::adapters::source::{guess_mime, scratch_name};
use crate::domain::error::FetchError;
use crate::domain::jobs::MediaAsset;
use crate::ports::fetcher::{FetchedSource, SourceFetcher};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Downloads `http(s)://` sources, streaming the body to the scratch file.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` bounds the whole request, body included.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str, workspace: &Path) -> Result<FetchedSource, FetchError> {
        let url = Url::parse(locator.trim()).map_err(|e| FetchError::InvalidLocator {
            locator: locator.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidLocator {
                locator: locator.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| guess_mime(url.path()))
            .to_string();

        let path = workspace.join(scratch_name(url.path()));
        let mut file = BufWriter::new(File::create(&path).await?);
        let mut size: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(%url, size, mime_type = %mime_type, "downloaded source");

        Ok(FetchedSource {
            asset: MediaAsset {
                locator: locator.to_string(),
                size,
                mime_type,
            },
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tempfile::tempdir;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fixture_router() -> Router {
        Router::new()
            .route(
                "/clip.mp4",
                get(|| async { ([(header::CONTENT_TYPE, "video/mp4; codecs=avc1")], vec![9u8; 4096]) }),
            )
            .route(
                "/broken",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/slow.mp4",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
    }

    #[tokio::test]
    async fn test_fetch_streams_body_to_workspace() {
        let base = serve(fixture_router()).await;
        let workspace = tempdir().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let fetched = fetcher
            .fetch(&format!("{}/clip.mp4", base), workspace.path())
            .await
            .unwrap();

        assert_eq!(fetched.path, workspace.path().join("source.mp4"));
        assert_eq!(fetched.asset.size, 4096);
        assert_eq!(fetched.asset.mime_type, "video/mp4");
        assert_eq!(std::fs::read(&fetched.path).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_not_found_is_status_error() {
        let base = serve(fixture_router()).await;
        let workspace = tempdir().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let err = fetcher
            .fetch(&format!("{}/missing.mp4", base), workspace.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
        assert!(!err.is_retryable());
        assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let base = serve(fixture_router()).await;
        let workspace = tempdir().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let err = fetcher
            .fetch(&format!("{}/broken", base), workspace.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout() {
        let base = serve(fixture_router()).await;
        let workspace = tempdir().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();

        let err = fetcher
            .fetch(&format!("{}/slow.mp4", base), workspace.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_malformed_locator() {
        let workspace = tempdir().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch("http//nope", workspace.path()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidLocator { .. }));
    }
}
