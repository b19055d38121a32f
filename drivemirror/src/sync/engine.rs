use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collision::{PlannedChild, plan_children};
use super::decision::{DEFAULT_TOLERANCE, SyncDecision, decide_file};
use super::remote::{NodeKind, RemoteError, RemoteNode, RemoteTree};
use super::sanitize::folder_component;
use super::stats::{RunStats, RunSummary};
use super::transfer::{DEFAULT_CHUNK_SIZE, Downloader, TransferError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("failed to create directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("remote node {0} is not a folder")]
    NotAFolder(String),
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub tolerance: u64,
    pub chunk_size: usize,
    pub download_concurrency: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_concurrency: 4,
        }
    }
}

pub struct MirrorEngine {
    remote: Arc<dyn RemoteTree>,
    options: EngineOptions,
    downloader: Downloader,
}

impl MirrorEngine {
    pub fn new(remote: Arc<dyn RemoteTree>, options: EngineOptions) -> Self {
        Self {
            remote,
            options,
            downloader: Downloader::new(options.chunk_size),
        }
    }

    /// Mirrors the remote folder `root_id` into `base_dir/<folder name>`.
    ///
    /// Nothing is created locally unless the root's metadata can be read
    /// and it is a folder.
    pub async fn mirror(
        &self,
        root_id: &str,
        base_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        let root = self.remote.get_metadata(root_id).await?;
        if !root.is_folder() {
            return Err(EngineError::NotAFolder(root_id.to_string()));
        }
        let local_root = base_dir.join(folder_component(&root.name));
        info!(
            root = %root.name,
            target = %local_root.display(),
            "starting mirror"
        );

        let stats = Arc::new(RunStats::new());
        self.sync(&root.id, &local_root, &stats, cancel).await?;
        Ok(stats.snapshot())
    }

    /// Reconciles `local_dir` with the remote folder `folder_id` and
    /// everything below it.
    ///
    /// Per-file download failures land in `stats`. A listing or
    /// directory-creation failure stops the walk, cancels in-flight
    /// downloads, waits for them to clean up and is returned.
    pub async fn sync(
        &self,
        folder_id: &str,
        local_dir: &Path,
        stats: &Arc<RunStats>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let run = cancel.child_token();
        let limit = Arc::new(Semaphore::new(self.options.download_concurrency.max(1)));
        let mut downloads = JoinSet::new();

        let result = self
            .walk(folder_id, local_dir, stats, &run, &limit, &mut downloads)
            .await;
        if result.is_err() {
            run.cancel();
        }

        while let Some(joined) = downloads.join_next().await {
            log_join(joined);
        }
        if cancel.is_cancelled() {
            stats.mark_cancelled();
        }
        result
    }

    async fn walk(
        &self,
        folder_id: &str,
        local_dir: &Path,
        stats: &Arc<RunStats>,
        run: &CancellationToken,
        limit: &Arc<Semaphore>,
        downloads: &mut JoinSet<()>,
    ) -> Result<(), EngineError> {
        let mut pending = vec![(folder_id.to_string(), local_dir.to_path_buf())];

        'walk: while let Some((id, dir)) = pending.pop() {
            if run.is_cancelled() {
                break;
            }
            ensure_dir(&dir).await?;

            let children = tokio::select! {
                biased;
                _ = run.cancelled() => break,
                listed = self.remote.list_children(&id) => listed?,
            };

            let mut subfolders = Vec::new();
            for PlannedChild { node, local_name } in plan_children(children) {
                let path = dir.join(&local_name);
                let decision = match node.kind {
                    NodeKind::Folder => SyncDecision::CreateDirectory,
                    NodeKind::File => {
                        let local = tokio::fs::metadata(&path).await.ok();
                        decide_file(local.as_ref(), node.size, self.options.tolerance)
                    }
                };

                match decision {
                    SyncDecision::CreateDirectory => subfolders.push((node.id, path)),
                    SyncDecision::Skip => {
                        debug!(file = %local_name, "already synced, skipping");
                        stats.record_skip();
                    }
                    SyncDecision::Download => {
                        let permit = tokio::select! {
                            biased;
                            _ = run.cancelled() => break 'walk,
                            permit = Arc::clone(limit).acquire_owned() => permit,
                        };
                        let Ok(permit) = permit else {
                            break 'walk;
                        };
                        let remote = Arc::clone(&self.remote);
                        let downloader = self.downloader;
                        let cancel = run.clone();
                        let guard = OutcomeGuard::new(Arc::clone(stats), local_name, path);
                        downloads.spawn(async move {
                            let _permit = permit;
                            let name = guard.file_name.as_str();
                            info!(file = %name, size = node.size, "downloading");
                            let outcome =
                                fetch_to(remote.as_ref(), &downloader, &node, &guard.path, &cancel)
                                    .await;
                            match &outcome {
                                Ok(bytes) => info!(file = %name, bytes, "downloaded"),
                                Err(err) => warn!(file = %name, error = %err, "download failed"),
                            }
                            guard.finish(&outcome);
                        });
                        while let Some(joined) = downloads.try_join_next() {
                            log_join(joined);
                        }
                    }
                }
            }

            // Reversed so the stack pops subfolders in listing order.
            pending.extend(subfolders.into_iter().rev());
        }
        Ok(())
    }
}

/// Owns the stats entry of one download. Dropped without `finish`, which
/// happens when the task panics or is aborted, it records an `Aborted`
/// failure.
struct OutcomeGuard {
    stats: Arc<RunStats>,
    file_name: String,
    path: PathBuf,
    finished: bool,
}

impl OutcomeGuard {
    fn new(stats: Arc<RunStats>, file_name: String, path: PathBuf) -> Self {
        Self {
            stats,
            file_name,
            path,
            finished: false,
        }
    }

    fn finish(mut self, outcome: &Result<u64, TransferError>) {
        self.finished = true;
        self.stats
            .record_outcome(&self.file_name, self.path.clone(), outcome);
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.stats
                .record_failure(&self.file_name, self.path.clone(), &TransferError::Aborted);
        }
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        warn!(error = %err, "download task did not complete");
    }
}

async fn fetch_to(
    remote: &dyn RemoteTree,
    downloader: &Downloader,
    node: &RemoteNode,
    target: &Path,
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        stream = remote.fetch(node) => stream?,
    };
    downloader.download(stream, target, cancel).await
}

async fn ensure_dir(dir: &Path) -> Result<(), EngineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
