//! Job-scoped resources: the scratch workspace and the source asset.
//!
//! The workspace is a guard. `release` removes it explicitly and reports
//! failures; if a job unwinds or returns early without releasing, `Drop`
//! removes it anyway.

use crate::domain::error::CleanupError;
use crate::ports::storage::StoragePort;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh directory under `root`, unique per call.
    pub fn acquire(root: &Path, job_id: Uuid) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("framereel-{}-", job_id))
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        tracing::debug!(path = ?path, "workspace acquired");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the directory. Later calls do nothing.
    pub fn release(&mut self) -> Result<(), CleanupError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        dir.close().map_err(|e| CleanupError::Workspace {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = ?self.path, "workspace released");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub workspace_removed: bool,
    pub source_deleted: bool,
    pub errors: Vec<CleanupError>,
}

/// Owns everything a job must give back when it ends.
#[derive(Debug)]
pub struct JobLifecycle {
    workspace: Workspace,
    source_locator: String,
    report: Option<CleanupReport>,
}

impl JobLifecycle {
    pub fn begin(root: &Path, job_id: Uuid, source_locator: &str) -> io::Result<Self> {
        Ok(Self {
            workspace: Workspace::acquire(root, job_id)?,
            source_locator: source_locator.to_string(),
            report: None,
        })
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Remove the workspace and delete the source asset. Neither failure is
    /// escalated. Only the first call does any work; repeats return the
    /// first report.
    pub async fn cleanup<S>(&mut self, storage: &S) -> CleanupReport
    where
        S: StoragePort + ?Sized,
    {
        if let Some(report) = &self.report {
            return report.clone();
        }

        let mut errors = Vec::new();

        let workspace_removed = match self.workspace.release() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "workspace cleanup failed");
                errors.push(e);
                false
            }
        };

        let source_deleted = match storage.delete(&self.source_locator).await {
            Ok(()) => {
                tracing::info!(source = %self.source_locator, "source asset deleted");
                true
            }
            Err(e) => {
                tracing::warn!(source = %self.source_locator, error = %e, "source asset deletion failed");
                errors.push(CleanupError::SourceDelete {
                    locator: self.source_locator.clone(),
                    reason: e.to_string(),
                });
                false
            }
        };

        let report = CleanupReport {
            workspace_removed,
            source_deleted,
            errors,
        };
        self.report = Some(report.clone());
        report
    }
}
