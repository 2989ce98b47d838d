// src/pipeline/history.rs

//! Recorded batch runs.

use std::future::Future;

use chrono::Utc;

use crate::error::Result;
use crate::models::RunStatus;
use crate::storage::HistoryStore;

/// Run `job` inside a `RunHistory` named `name`.
///
/// The record ends `finished` when the job succeeds, `canceled` when it
/// returns `Interrupted`, and `failed` otherwise. The job's result is returned
/// unchanged; a failure to confirm the record is only returned when the job
/// itself succeeded.
pub async fn run_batch<H, F, Fut, T>(
    store: &H,
    name: &str,
    options: serde_json::Value,
    job: F,
) -> Result<T>
where
    H: HistoryStore + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let history = store.create_history(name, options).await?;
    log::info!("Started {} (run {})", name, history.id);

    let result = job().await;
    let status = match &result {
        Ok(_) => RunStatus::Finished,
        Err(e) if e.is_interrupted() => RunStatus::Canceled,
        Err(_) => RunStatus::Failed,
    };

    let confirmed = match history.confirmed(status, Utc::now()) {
        Ok(confirmed) => store.confirm_history(&confirmed).await,
        Err(e) => Err(e),
    };

    match (&result, confirmed) {
        (_, Ok(())) => {
            let elapsed = Utc::now() - history.started_at;
            log::info!(
                "{} (run {}) {} after {}s",
                name,
                history.id,
                status,
                elapsed.num_seconds()
            );
        }
        (Ok(_), Err(e)) => {
            log::error!("Failed to record {} (run {}): {}", name, history.id, e);
            return Err(e);
        }
        (Err(_), Err(e)) => {
            log::error!("Failed to record {} (run {}): {}", name, history.id, e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::RunHistory;
    use crate::storage::SqliteStore;

    #[tokio::test]
    async fn test_successful_job_finishes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let value = run_batch(&store, "update-user", serde_json::json!({"chunk_size": 10}), || async {
            Ok(42)
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        let latest = store.latest_finished("update-user").await.unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Finished);
        assert!(latest.finished_at.is_some());
        assert_eq!(latest.options["chunk_size"], 10);
    }

    #[tokio::test]
    async fn test_failed_job_is_not_finished() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = run_batch(&store, "update-problem", serde_json::Value::Null, || async {
            Err::<(), _>(AppError::build("abc001_a", "no statement"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Build { .. }));
        assert!(store.latest_finished("update-problem").await.unwrap().is_none());
    }

    /// Keeps every confirmed record.
    #[derive(Default)]
    struct MemoryHistory {
        confirmed: std::sync::Mutex<Vec<RunHistory>>,
    }

    #[async_trait::async_trait]
    impl HistoryStore for MemoryHistory {
        async fn create_history(&self, name: &str, options: serde_json::Value) -> Result<RunHistory> {
            Ok(RunHistory {
                id: 1,
                name: name.to_string(),
                started_at: Utc::now(),
                finished_at: None,
                status: RunStatus::Working,
                options,
            })
        }

        async fn confirm_history(&self, history: &RunHistory) -> Result<()> {
            self.confirmed.lock().unwrap().push(history.clone());
            Ok(())
        }

        async fn latest_finished(&self, _name: &str) -> Result<Option<RunHistory>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_interrupted_job_is_canceled() {
        let store = MemoryHistory::default();
        let err = run_batch(&store, "crawl-user", serde_json::Value::Null, || async {
            Err::<(), _>(AppError::Interrupted)
        })
        .await
        .unwrap_err();

        assert!(err.is_interrupted());
        let confirmed = store.confirmed.lock().unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].status, RunStatus::Canceled);
    }
}
