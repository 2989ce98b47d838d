//! End-to-end runs: stored rows -> chunk files -> index core, inside a
//! recorded batch.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use acs_batch::error::{AppError, Result};
use acs_batch::models::{RunStatus, User};
use acs_batch::pipeline::{
    self, ChunkWriter, RowSource, UploadOptions, UserBuilder, list_chunks, run_batch,
};
use acs_batch::services::IndexCore;
use acs_batch::storage::{CrawlSink, HistoryStore, RowFilter, SqliteStore};
use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Index core that records every call and the user names it was sent.
#[derive(Default)]
struct FakeCore {
    calls: Mutex<Vec<&'static str>>,
    posted: Mutex<Vec<String>>,
    cancel_on_post: Option<CancellationToken>,
}

impl FakeCore {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexCore for FakeCore {
    fn name(&self) -> &str {
        "user"
    }

    async fn ping(&self) -> Result<String> {
        Ok("OK".to_string())
    }

    async fn post(&self, body: Vec<u8>, _content_type: &str) -> Result<()> {
        self.calls.lock().unwrap().push("post");
        let docs: Vec<serde_json::Value> = serde_json::from_slice(&body)?;
        self.posted.lock().unwrap().extend(
            docs.iter()
                .filter_map(|d| d["user_name"].as_str().map(str::to_string)),
        );
        if let Some(token) = &self.cancel_on_post {
            token.cancel();
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.calls.lock().unwrap().push("commit");
        Ok(())
    }

    async fn optimize(&self) -> Result<()> {
        self.calls.lock().unwrap().push("optimize");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.calls.lock().unwrap().push("rollback");
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        self.calls.lock().unwrap().push("truncate");
        Ok(())
    }
}

fn user_name(i: usize) -> String {
    format!("user{i:04}")
}

async fn seeded_store(dir: &Path, count: usize) -> SqliteStore {
    let store = SqliteStore::open(dir.join("acs.db")).unwrap();
    let users: Vec<User> = (0..count)
        .map(|i| User {
            user_name: user_name(i),
            rating: (i as i64 * 7) % 4000,
            highest_rating: (i as i64 * 7) % 4000,
            join_count: 1,
            rank: i as i64 + 1,
            ..User::default()
        })
        .collect();
    let saved = CrawlSink::<User>::save(&store, "users", users, Utc::now())
        .await
        .unwrap();
    assert_eq!(saved, count);
    store
}

async fn update_users(
    token: &CancellationToken,
    store: &SqliteStore,
    core: Arc<FakeCore>,
    save_dir: &Path,
) -> Result<()> {
    run_batch(store, "update-user", serde_json::json!({"domain": "user"}), || async {
        let writer = ChunkWriter::new(save_dir, 1000);
        writer.prepare().await?;
        let source: Arc<dyn RowSource<User>> = Arc::new(store.clone());
        pipeline::generate(token, source, RowFilter::all(), Arc::new(UserBuilder), writer, 4)
            .await?;
        pipeline::upload(
            token,
            core,
            save_dir,
            UploadOptions {
                concurrency: 4,
                optimize: false,
                truncate: false,
            },
        )
        .await?;
        Ok::<_, AppError>(())
    })
    .await
}

fn stored_status(db: &Path, name: &str) -> String {
    let conn = rusqlite::Connection::open(db).unwrap();
    conn.query_row(
        "SELECT status FROM run_history WHERE name = ?1 ORDER BY id DESC LIMIT 1",
        [name],
        |row| row.get(0),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_uploads_every_row_once() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(tmp.path(), 2500).await;
    let save_dir = tmp.path().join("documents/user");
    let core = Arc::new(FakeCore::default());

    update_users(&CancellationToken::new(), &store, core.clone(), &save_dir)
        .await
        .unwrap();

    let files = list_chunks(&save_dir).await.unwrap();
    let sizes: Vec<usize> = files
        .iter()
        .map(|path| {
            let docs: Vec<serde_json::Value> =
                serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
            docs.len()
        })
        .collect();
    let mut sorted = sizes.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![500, 1000, 1000]);
    // only the last chunk can be partial
    assert_eq!(sizes.last(), Some(&500));

    let posted = core.posted.lock().unwrap().clone();
    assert_eq!(posted.len(), 2500);
    let unique: HashSet<String> = posted.into_iter().collect();
    let expected: HashSet<String> = (0..2500).map(user_name).collect();
    assert_eq!(unique, expected);

    let calls = core.calls();
    assert_eq!(calls.iter().filter(|c| **c == "post").count(), 3);
    assert_eq!(calls.last(), Some(&"commit"));
    assert!(!calls.contains(&"rollback"));

    let latest = store.latest_finished("update-user").await.unwrap().unwrap();
    assert_eq!(latest.status, RunStatus::Finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_during_upload_rolls_back() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(tmp.path(), 2500).await;
    let save_dir = tmp.path().join("documents/user");
    let token = CancellationToken::new();
    let core = Arc::new(FakeCore {
        cancel_on_post: Some(token.clone()),
        ..FakeCore::default()
    });

    let err = update_users(&token, &store, core.clone(), &save_dir)
        .await
        .unwrap_err();
    assert!(err.is_interrupted());

    // generation finished before the first post, so every chunk exists
    assert_eq!(list_chunks(&save_dir).await.unwrap().len(), 3);

    let calls = core.calls();
    assert_eq!(calls.last(), Some(&"rollback"));
    assert!(!calls.contains(&"commit"));
    assert!(!calls.contains(&"optimize"));

    assert_eq!(stored_status(&tmp.path().join("acs.db"), "update-user"), "canceled");
    assert!(store.latest_finished("update-user").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_store_commits_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(tmp.path(), 0).await;
    let save_dir = tmp.path().join("documents/user");
    let core = Arc::new(FakeCore::default());

    update_users(&CancellationToken::new(), &store, core.clone(), &save_dir)
        .await
        .unwrap();

    assert!(list_chunks(&save_dir).await.unwrap().is_empty());
    assert_eq!(core.calls(), vec!["commit"]);
}
