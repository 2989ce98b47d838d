// src/pipeline/upload.rs

//! Chunk upload with a single terminal index action.
//!
//! ```text
//! Truncating -> Uploading -> Committing | Optimizing | RollingBack -> Done
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::chunk::list_chunks;
use super::generate::join_stages;
use crate::error::{AppError, Result};
use crate::services::IndexCore;

const CHUNK_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub concurrency: usize,
    pub optimize: bool,
    pub truncate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Truncating,
    Uploading,
    Committing,
    Optimizing,
    RollingBack,
    Done,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Truncating => "truncating",
            Self::Uploading => "uploading",
            Self::Committing => "committing",
            Self::Optimizing => "optimizing",
            Self::RollingBack => "rolling back",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub files: usize,
    /// `Committing` or `Optimizing`: the action that made the batch visible.
    pub finished_with: UploadPhase,
}

/// Upload every chunk in `save_dir` to `core`.
///
/// A failed truncate or upload, and a cancellation observed before the
/// terminal action, end in a rollback. Rollback is never raced against
/// `token`.
pub async fn upload(
    token: &CancellationToken,
    core: Arc<dyn IndexCore>,
    save_dir: &Path,
    options: UploadOptions,
) -> Result<UploadSummary> {
    let token = token.child_token();
    let mut phase = UploadPhase::Truncating;

    if options.truncate {
        log::info!("Truncating core {}", core.name());
        let truncated = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AppError::Interrupted),
            result = core.truncate() => result,
        };
        if let Err(error) = truncated {
            return roll_back(core.as_ref(), phase, error).await;
        }
    }

    phase = enter(core.as_ref(), phase, UploadPhase::Uploading);
    let files = match list_chunks(save_dir).await {
        Ok(files) => files,
        Err(error) => return roll_back(core.as_ref(), phase, error).await,
    };
    log::info!(
        "Uploading {} chunks from {} to core {} ({} workers)",
        files.len(),
        save_dir.display(),
        core.name(),
        options.concurrency.max(1)
    );

    if let Err(error) = post_all(&token, &core, files.clone(), options.concurrency).await {
        return roll_back(core.as_ref(), phase, error).await;
    }
    if token.is_cancelled() {
        return roll_back(core.as_ref(), phase, AppError::Interrupted).await;
    }

    let finished_with = if options.optimize {
        enter(core.as_ref(), phase, UploadPhase::Optimizing);
        core.optimize().await?;
        UploadPhase::Optimizing
    } else {
        enter(core.as_ref(), phase, UploadPhase::Committing);
        core.commit().await?;
        UploadPhase::Committing
    };
    enter(core.as_ref(), finished_with, UploadPhase::Done);

    log::info!("Uploaded {} chunks to core {}", files.len(), core.name());
    Ok(UploadSummary {
        files: files.len(),
        finished_with,
    })
}

fn enter(core: &dyn IndexCore, from: UploadPhase, to: UploadPhase) -> UploadPhase {
    log::debug!("Core {}: {} -> {}", core.name(), from, to);
    to
}

/// Roll back after `error` and return it.
async fn roll_back<T>(core: &dyn IndexCore, from: UploadPhase, error: AppError) -> Result<T> {
    if error.is_interrupted() {
        log::warn!("Upload to core {} interrupted while {}", core.name(), from);
    } else {
        log::error!("Upload to core {} failed while {}: {}", core.name(), from, error);
    }

    enter(core, from, UploadPhase::RollingBack);
    if let Err(rollback_error) = core.rollback().await {
        log::error!("Rollback of core {} failed: {}", core.name(), rollback_error);
    }
    enter(core, UploadPhase::RollingBack, UploadPhase::Done);
    Err(error)
}

async fn post_all(
    token: &CancellationToken,
    core: &Arc<dyn IndexCore>,
    files: Vec<PathBuf>,
    concurrency: usize,
) -> Result<()> {
    let (tx, rx) = mpsc::channel(files.len().max(1));
    for path in files {
        // capacity covers every file
        if tx.try_send(path).is_err() {
            return Err(AppError::validation("upload queue rejected a chunk path"));
        }
    }
    drop(tx);

    let rx = Arc::new(Mutex::new(rx));
    let mut workers = JoinSet::new();
    for id in 0..concurrency.max(1) {
        let token = token.clone();
        let core = Arc::clone(core);
        let rx = Arc::clone(&rx);
        workers.spawn(async move { upload_worker(id, token, core, rx).await });
    }

    match join_stages(token, &mut workers, |_| {}).await {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

async fn upload_worker(
    id: usize,
    token: CancellationToken,
    core: Arc<dyn IndexCore>,
    files: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
) -> Result<usize> {
    let mut posted = 0;
    loop {
        if token.is_cancelled() {
            return Err(AppError::Interrupted);
        }
        let next = files.lock().await.recv().await;
        let Some(path) = next else { break };

        let body = tokio::fs::read(&path).await?;
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AppError::Interrupted),
            result = core.post(body, CHUNK_CONTENT_TYPE) => result,
        };
        result.map_err(|e| {
            log::error!("Worker {} failed to post {}: {}", id, path.display(), e);
            e
        })?;

        log::debug!("Worker {} posted {}", id, path.display());
        posted += 1;
    }
    log::debug!("Upload worker {} posted {} chunks", id, posted);
    Ok(posted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    use crate::pipeline::chunk::chunk_path;

    #[derive(Default)]
    struct RecordingCore {
        calls: StdMutex<Vec<String>>,
        fail_post: bool,
        fail_truncate: bool,
    }

    impl RecordingCore {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl IndexCore for RecordingCore {
        fn name(&self) -> &str {
            "test"
        }

        async fn ping(&self) -> Result<String> {
            Ok("OK".to_string())
        }

        async fn post(&self, _body: Vec<u8>, content_type: &str) -> Result<()> {
            assert_eq!(content_type, "application/json");
            self.record("post");
            if self.fail_post {
                return Err(AppError::index("update", "400 Bad Request"));
            }
            Ok(())
        }

        async fn commit(&self) -> Result<()> {
            self.record("commit");
            Ok(())
        }

        async fn optimize(&self) -> Result<()> {
            self.record("optimize");
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            self.record("rollback");
            Ok(())
        }

        async fn truncate(&self) -> Result<()> {
            self.record("truncate");
            if self.fail_truncate {
                return Err(AppError::index("truncate", "503"));
            }
            Ok(())
        }
    }

    fn chunks(count: usize) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for n in 1..=count {
            std::fs::write(chunk_path(tmp.path(), n), "[]").unwrap();
        }
        tmp
    }

    fn options(optimize: bool, truncate: bool) -> UploadOptions {
        UploadOptions {
            concurrency: 2,
            optimize,
            truncate,
        }
    }

    #[tokio::test]
    async fn test_upload_then_commit() {
        let dir = chunks(3);
        let core = Arc::new(RecordingCore::default());
        let summary = upload(
            &CancellationToken::new(),
            core.clone(),
            dir.path(),
            options(false, true),
        )
        .await
        .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.finished_with, UploadPhase::Committing);
        assert_eq!(
            core.calls(),
            vec!["truncate", "post", "post", "post", "commit"]
        );
    }

    #[tokio::test]
    async fn test_optimize_replaces_commit() {
        let dir = chunks(1);
        let core = Arc::new(RecordingCore::default());
        upload(
            &CancellationToken::new(),
            core.clone(),
            dir.path(),
            options(true, false),
        )
        .await
        .unwrap();

        assert_eq!(core.calls(), vec!["post", "optimize"]);
    }

    #[tokio::test]
    async fn test_post_failure_rolls_back() {
        let dir = chunks(4);
        let core = Arc::new(RecordingCore {
            fail_post: true,
            ..RecordingCore::default()
        });
        let err = upload(
            &CancellationToken::new(),
            core.clone(),
            dir.path(),
            options(false, false),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Index { ref action, .. } if action == "update"));
        let calls = core.calls();
        assert_eq!(calls.last().map(String::as_str), Some("rollback"));
        assert!(!calls.iter().any(|c| c == "commit" || c == "optimize"));
    }

    #[tokio::test]
    async fn test_truncate_failure_rolls_back() {
        let dir = chunks(2);
        let core = Arc::new(RecordingCore {
            fail_truncate: true,
            ..RecordingCore::default()
        });
        let err = upload(
            &CancellationToken::new(),
            core.clone(),
            dir.path(),
            options(false, true),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Index { .. }));
        assert_eq!(core.calls(), vec!["truncate", "rollback"]);
    }

    #[tokio::test]
    async fn test_cancelled_upload_rolls_back() {
        let dir = chunks(2);
        let core = Arc::new(RecordingCore::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = upload(&token, core.clone(), dir.path(), options(true, false))
            .await
            .unwrap_err();

        assert!(err.is_interrupted());
        assert_eq!(core.calls(), vec!["rollback"]);
    }

    #[tokio::test]
    async fn test_empty_dir_still_commits() {
        let tmp = TempDir::new().unwrap();
        let core = Arc::new(RecordingCore::default());
        let summary = upload(
            &CancellationToken::new(),
            core.clone(),
            tmp.path(),
            options(false, false),
        )
        .await
        .unwrap();

        assert_eq!(summary.files, 0);
        assert_eq!(core.calls(), vec!["commit"]);
    }

    #[tokio::test]
    async fn test_unreadable_chunk_dir_rolls_back_truncate() {
        let tmp = TempDir::new().unwrap();
        let not_a_dir = tmp.path().join("doc-1.json");
        std::fs::write(&not_a_dir, "[]").unwrap();
        let core = Arc::new(RecordingCore::default());

        let err = upload(
            &CancellationToken::new(),
            core.clone(),
            &not_a_dir,
            options(false, true),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Io(_)));
        assert_eq!(core.calls(), vec!["truncate", "rollback"]);
    }
}
