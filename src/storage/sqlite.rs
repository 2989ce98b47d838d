// src/storage/sqlite.rs

//! SQLite-backed store.
//!
//! One connection guarded by a mutex; every call runs on the blocking pool.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::schema::SCHEMA;
use super::{CrawlSink, HistoryStore};
use crate::error::{AppError, Result};
use crate::models::{Contest, Difficulty, Problem, RunHistory, RunStatus, Submission, User};

const SUBMISSION_DOMAIN: &str = "submission";
const USER_DOMAIN: &str = "user";

/// Store for crawled rows, watermarks and run history.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file, enabling WAL and creating the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            r#"
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        conn.execute_batch(SCHEMA)?;
        log::debug!("Opened database at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// In-memory database with the same schema.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    pub(super) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| AppError::storage("database connection lock poisoned"))?;
            f(&mut conn)
        })
        .await?
    }

    /// Upsert contests together with their assigned category.
    pub async fn upsert_contests(&self, contests: Vec<(Contest, String)>) -> Result<usize> {
        self.with_conn(move |conn| {
            let now = to_millis(Utc::now());
            let tx = conn.transaction()?;
            let mut count = 0;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO contests
                        (contest_id, start_epoch_second, duration_second, title, rate_change, category, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT (contest_id) DO UPDATE SET
                        start_epoch_second = excluded.start_epoch_second,
                        duration_second = excluded.duration_second,
                        title = excluded.title,
                        rate_change = excluded.rate_change,
                        category = excluded.category,
                        updated_at = excluded.updated_at
                    "#,
                )?;
                for (contest, category) in &contests {
                    count += stmt.execute(params![
                        contest.id,
                        contest.start_epoch_second,
                        contest.duration_second,
                        contest.title,
                        contest.rate_change,
                        category,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(count)
        })
        .await
    }

    /// Upsert difficulty estimates keyed by problem id.
    pub async fn upsert_difficulties(&self, difficulties: Vec<(String, Difficulty)>) -> Result<usize> {
        self.with_conn(move |conn| {
            let now = to_millis(Utc::now());
            let tx = conn.transaction()?;
            let mut count = 0;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO difficulties
                        (problem_id, slope, intercept, variance, difficulty, discrimination,
                         irt_loglikelihood, irt_users, is_experimental, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT (problem_id) DO UPDATE SET
                        slope = excluded.slope,
                        intercept = excluded.intercept,
                        variance = excluded.variance,
                        difficulty = excluded.difficulty,
                        discrimination = excluded.discrimination,
                        irt_loglikelihood = excluded.irt_loglikelihood,
                        irt_users = excluded.irt_users,
                        is_experimental = excluded.is_experimental,
                        updated_at = excluded.updated_at
                    "#,
                )?;
                for (problem_id, d) in &difficulties {
                    count += stmt.execute(params![
                        problem_id,
                        d.slope,
                        d.intercept,
                        d.variance,
                        d.difficulty,
                        d.discrimination,
                        d.irt_loglikelihood,
                        d.irt_users,
                        d.is_experimental,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(count)
        })
        .await
    }

    /// Ids of every stored problem.
    pub async fn problem_ids(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT problem_id FROM problems")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(ids)
        })
        .await
    }

    /// Store one problem and its statement HTML in its own transaction.
    pub async fn save_problem(&self, problem: Problem, html: String) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r#"
                INSERT INTO problems
                    (problem_id, contest_id, problem_index, name, title, url, html, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (problem_id) DO UPDATE SET
                    contest_id = excluded.contest_id,
                    problem_index = excluded.problem_index,
                    name = excluded.name,
                    title = excluded.title,
                    url = excluded.url,
                    html = excluded.html,
                    updated_at = excluded.updated_at
                "#,
                params![
                    problem.id,
                    problem.contest_id,
                    problem.problem_index,
                    problem.name,
                    problem.title,
                    problem.url(),
                    html,
                    to_millis(Utc::now()),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Contest ids, newest first, optionally restricted to some categories.
    pub async fn contest_ids(&self, categories: Vec<String>) -> Result<Vec<String>> {
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT contest_id FROM contests");
            if !categories.is_empty() {
                let placeholders: Vec<String> =
                    (1..=categories.len()).map(|i| format!("?{i}")).collect();
                sql.push_str(&format!(" WHERE category IN ({})", placeholders.join(", ")));
            }
            sql.push_str(" ORDER BY start_epoch_second DESC");

            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params_from_iter(categories.iter()), |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn watermark(&self, domain: &'static str, partition: &str) -> Result<Option<DateTime<Utc>>> {
        let partition = partition.to_string();
        let millis: Option<i64> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT crawled_at FROM crawl_watermarks WHERE domain = ?1 AND partition_key = ?2",
                        params![domain, partition],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        millis.map(from_millis).transpose()
    }
}

fn save_watermark(
    tx: &rusqlite::Transaction<'_>,
    domain: &str,
    partition: &str,
    crawled_at: DateTime<Utc>,
) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO crawl_watermarks (domain, partition_key, crawled_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (domain, partition_key) DO UPDATE SET crawled_at = excluded.crawled_at
        "#,
        params![domain, partition, to_millis(crawled_at)],
    )?;
    Ok(())
}

pub(super) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(super) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::storage(format!("timestamp out of range: {millis}")))
}

type HistoryColumns = (i64, String, i64, Option<i64>, String, String);

fn history_from_columns(columns: HistoryColumns) -> Result<RunHistory> {
    let (id, name, started_at, finished_at, status, options) = columns;
    Ok(RunHistory {
        id,
        name,
        started_at: from_millis(started_at)?,
        finished_at: finished_at.map(from_millis).transpose()?,
        status: status.parse()?,
        options: serde_json::from_str(&options)?,
    })
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn create_history(&self, name: &str, options: serde_json::Value) -> Result<RunHistory> {
        let name = name.to_string();
        let started_at = from_millis(to_millis(Utc::now()))?;
        let encoded = serde_json::to_string(&options)?;

        let id = {
            let name = name.clone();
            self.with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO run_history (name, started_at, finished_at, status, options) VALUES (?1, ?2, NULL, ?3, ?4)",
                    params![name, to_millis(started_at), RunStatus::Working.as_str(), encoded],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?
        };

        Ok(RunHistory {
            id,
            name,
            started_at,
            finished_at: None,
            status: RunStatus::Working,
            options,
        })
    }

    async fn confirm_history(&self, history: &RunHistory) -> Result<()> {
        if !history.status.is_terminal() {
            return Err(AppError::storage(format!(
                "run history {} can only be confirmed with a terminal status",
                history.id
            )));
        }

        let id = history.id;
        let status = history.status.as_str();
        let finished_at = history.finished_at.map(to_millis);

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE run_history SET status = ?1, finished_at = ?2 WHERE id = ?3 AND status = ?4",
                params![status, finished_at, id, RunStatus::Working.as_str()],
            )?;
            if changed == 0 {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT status FROM run_history WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                return match current {
                    Some(status) => Err(AppError::AlreadyConfirmed { id, status }),
                    None => Err(AppError::storage(format!("run history {id} not found"))),
                };
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn latest_finished(&self, name: &str) -> Result<Option<RunHistory>> {
        let name = name.to_string();
        let columns: Option<HistoryColumns> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        r#"
                        SELECT id, name, started_at, finished_at, status, options
                        FROM run_history
                        WHERE name = ?1 AND status = ?2
                        ORDER BY started_at DESC, id DESC
                        LIMIT 1
                        "#,
                        params![name, RunStatus::Finished.as_str()],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .optional()?)
            })
            .await?;
        columns.map(history_from_columns).transpose()
    }
}

#[async_trait]
impl CrawlSink<Submission> for SqliteStore {
    async fn last_crawled(&self, partition: &str) -> Result<Option<DateTime<Utc>>> {
        self.watermark(SUBMISSION_DOMAIN, partition).await
    }

    async fn existing_ids(&self, partition: &str) -> Result<HashSet<i64>> {
        let contest_id = partition.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT id FROM submissions WHERE contest_id = ?1")?;
            let ids = stmt
                .query_map(params![contest_id], |row| row.get(0))?
                .collect::<rusqlite::Result<HashSet<i64>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn save(
        &self,
        partition: &str,
        items: Vec<Submission>,
        crawled_at: DateTime<Utc>,
    ) -> Result<usize> {
        let partition = partition.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut count = 0;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO submissions
                        (id, epoch_second, problem_id, contest_id, user_id, language,
                         point, length, result, execution_time, crawled_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT (id) DO UPDATE SET
                        epoch_second = excluded.epoch_second,
                        problem_id = excluded.problem_id,
                        contest_id = excluded.contest_id,
                        user_id = excluded.user_id,
                        language = excluded.language,
                        point = excluded.point,
                        length = excluded.length,
                        result = excluded.result,
                        execution_time = excluded.execution_time,
                        crawled_at = excluded.crawled_at
                    "#,
                )?;
                let crawled = to_millis(crawled_at);
                for s in &items {
                    count += stmt.execute(params![
                        s.id,
                        s.epoch_second,
                        s.problem_id,
                        s.contest_id,
                        s.user_id,
                        s.language,
                        s.point,
                        s.length,
                        s.result,
                        s.execution_time,
                        crawled,
                    ])?;
                }
            }
            save_watermark(&tx, SUBMISSION_DOMAIN, &partition, crawled_at)?;
            tx.commit()?;
            Ok(count)
        })
        .await
    }
}

#[async_trait]
impl CrawlSink<User> for SqliteStore {
    async fn last_crawled(&self, partition: &str) -> Result<Option<DateTime<Utc>>> {
        self.watermark(USER_DOMAIN, partition).await
    }

    /// Rankings change between crawls, so every user is stored again.
    async fn existing_ids(&self, _partition: &str) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn save(&self, partition: &str, items: Vec<User>, crawled_at: DateTime<Utc>) -> Result<usize> {
        let partition = partition.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut count = 0;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO users
                        (user_name, rating, highest_rating, affiliation, birth_year, country,
                         crown, join_count, rank, active_rank, wins, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    ON CONFLICT (user_name) DO UPDATE SET
                        rating = excluded.rating,
                        highest_rating = excluded.highest_rating,
                        affiliation = excluded.affiliation,
                        birth_year = excluded.birth_year,
                        country = excluded.country,
                        crown = excluded.crown,
                        join_count = excluded.join_count,
                        rank = excluded.rank,
                        active_rank = excluded.active_rank,
                        wins = excluded.wins,
                        updated_at = excluded.updated_at
                    "#,
                )?;
                let updated = to_millis(crawled_at);
                for u in &items {
                    count += stmt.execute(params![
                        u.user_name,
                        u.rating,
                        u.highest_rating,
                        u.affiliation,
                        u.birth_year,
                        u.country,
                        u.crown,
                        u.join_count,
                        u.rank,
                        u.active_rank,
                        u.wins,
                        updated,
                    ])?;
                }
            }
            save_watermark(&tx, USER_DOMAIN, &partition, crawled_at)?;
            tx.commit()?;
            Ok(count)
        })
        .await
    }
}
