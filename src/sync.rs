use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyhowResult};
use chrono::{DateTime, Utc};

use crate::client::{ClientError, RemoteClient, RemoteRecord};
use crate::error::Error;
use crate::hash::{self, ContentHash};
use crate::local::{LocalFile, LocalWalk};
use crate::path::remote_path;

/// Per-file outcome of the upload-skip rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No remote counterpart: create it.
    Create,
    /// Local is strictly newer and content differs: replace the remote file.
    Overwrite,
    /// Local mtime is not strictly newer than the remote one.
    SkipNotNewer,
    /// Local mtime is newer but content is unchanged (touch-only change).
    SkipSameContent,
}

impl Decision {
    pub fn is_upload(&self) -> bool {
        matches!(self, Decision::Create | Decision::Overwrite)
    }
}

/// The upload-skip rule. `local_hash` is only invoked when the timestamps
/// make a content comparison necessary.
pub fn decide<F>(
    local_modified: DateTime<Utc>,
    remote: &RemoteRecord,
    local_hash: F,
) -> AnyhowResult<Decision>
where
    F: FnOnce() -> AnyhowResult<ContentHash>,
{
    let remote_file = match remote {
        RemoteRecord::Absent => return Ok(Decision::Create),
        RemoteRecord::Found(remote_file) => remote_file,
    };

    if local_modified <= remote_file.modified {
        return Ok(Decision::SkipNotNewer);
    }

    if local_hash()? == remote_file.content_hash {
        return Ok(Decision::SkipSameContent);
    }

    Ok(Decision::Overwrite)
}

#[derive(Debug, thiserror::Error)]
pub enum FileSyncError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("{0:#}")]
    Local(#[from] anyhow::Error),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub examined: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// One-way sync of a local directory tree to a remote destination folder.
/// Processes files sequentially; a failure on one file abandons that file
/// only, except authentication failures which abort the run.
pub struct Syncer<'a> {
    client: &'a dyn RemoteClient,
    local_root: PathBuf,
    remote_root: String,
}

impl<'a> Syncer<'a> {
    pub fn new(client: &'a dyn RemoteClient, local_root: &Path, remote_root: &str) -> Self {
        Self {
            client,
            local_root: local_root.to_path_buf(),
            remote_root: remote_root.to_string(),
        }
    }

    pub fn sync(&self) -> Result<SyncReport, Error> {
        let mut report = SyncReport::default();

        for file in LocalWalk::new(&self.local_root).files() {
            let local = match file {
                Ok(local) => local,
                Err(error) => {
                    log::warn!("Abandon unreadable entry: {:#}", error);
                    report.errors += 1;
                    continue;
                }
            };
            report.examined += 1;

            match self.sync_file(&local) {
                Ok(decision) if decision.is_upload() => report.uploaded += 1,
                Ok(_) => report.skipped += 1,
                Err(FileSyncError::Client(ClientError::Authentication)) => {
                    return Err(Error::AuthenticationFailed)
                }
                Err(error) => {
                    log::warn!("Abandon {}: {}", local.relative_path.display(), error);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    fn sync_file(&self, local: &LocalFile) -> Result<Decision, FileSyncError> {
        let target = remote_path(&self.remote_root, &local.relative_path);
        let remote = self.client.get_metadata(&target)?;
        let decision = decide(local.modified, &remote, || {
            hash::hash_file(&local.absolute_path).context(format!(
                "Compute content hash of {}",
                local.absolute_path.display()
            ))
        })?;

        match decision {
            Decision::Create => {
                log::info!("Upload {} (new, {} bytes)", target, local.size);
                self.client
                    .upload(&local.absolute_path, &target, local.modified)?;
            }
            Decision::Overwrite => {
                log::info!("Upload {} (changed, {} bytes)", target, local.size);
                self.client
                    .upload(&local.absolute_path, &target, local.modified)?;
            }
            Decision::SkipNotNewer => log::info!("Skip {} (up to date)", target),
            Decision::SkipSameContent => log::info!("Skip {} (content unchanged)", target),
        }

        Ok(decision)
    }
}
