use crate::ports::storage::{StoragePort, StoredObject};
use async_trait::async_trait;
use std::error::Error;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum FsStorageError {
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("no object stored under {0:?}")]
    NotFound(String),

    #[error("{0:?} is not an object of this store")]
    Foreign(String),
}

/// Durable storage backed by a local directory. URLs are `file://` URLs
/// (or `base_url/key` when a base is configured).
#[derive(Clone, Debug)]
pub struct FsStorage {
    root: PathBuf,
    base_url: String,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let base_url = file_base_url(&root);
        Self { root, base_url }
    }

    pub fn with_base_url(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Key behind a URL this store handed out. Anything else, including
    /// bare keys and paths, is not ours to delete.
    fn key_of<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.base_url.as_str())?
            .strip_prefix('/')
            .filter(|key| !key.is_empty())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, FsStorageError> {
        if !key_is_valid(key) {
            return Err(FsStorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

fn file_base_url(root: &Path) -> String {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(root))
            .unwrap_or_else(|_| root.to_path_buf())
    };
    reqwest::Url::from_directory_path(&absolute)
        .map(|url| url.to_string().trim_end_matches('/').to_string())
        .unwrap_or_else(|_| format!("file://{}", absolute.display()))
}

/// Keys are relative paths without `..`.
fn key_is_valid(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    Path::new(key)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

/// `a/frame_00001.jpg` -> `a/frame_00001-2.jpg`
fn suffixed_key(key: &str, n: u32) -> String {
    let (dir, name) = match key.rfind('/') {
        Some(i) => (&key[..=i], &key[i + 1..]),
        None => ("", key),
    };
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{}-{}{}", dir, &name[..dot], n, &name[dot..]),
        _ => format!("{}{}-{}", dir, name, n),
    }
}

#[async_trait]
impl StoragePort for FsStorage {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let mut candidate = key.to_string();
        let mut attempt = 1;

        loop {
            let path = self.path_for(&candidate)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&bytes).await?;
                    file.flush().await?;
                    break;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    candidate = suffixed_key(key, attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(key = %candidate, content_type, size = bytes.len(), "stored object");
        Ok(self.url_for(&candidate))
    }

    async fn delete(&self, url: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let key = self
            .key_of(url)
            .ok_or_else(|| FsStorageError::Foreign(url.to_string()))?;
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FsStorageError::NotFound(key.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<StoredObject>, Box<dyn Error + Send + Sync>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                let path = entry.path();
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let timestamp = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);

                objects.push(StoredObject {
                    url: self.url_for(&key),
                    key,
                    size: metadata.len(),
                    timestamp,
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}
