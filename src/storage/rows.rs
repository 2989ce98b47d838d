//! Row queries for document generation and the streaming row source.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::sqlite::to_millis;
use super::{RowFilter, SqliteStore, StoredRow};
use crate::error::Result;
use crate::models::{ProblemRow, SubmissionRow, UserRow};
use crate::pipeline::RowSource;

impl StoredRow for ProblemRow {
    const QUERY: &'static str = r#"
        SELECT
            p.problem_id, p.title, p.url, p.contest_id, c.title,
            c.start_epoch_second, c.duration_second, c.rate_change, c.category,
            p.html, d.difficulty, COALESCE(d.is_experimental, 0)
        FROM problems AS p
        JOIN contests AS c ON p.contest_id = c.contest_id
        LEFT JOIN difficulties AS d ON p.problem_id = d.problem_id
    "#;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            problem_id: row.get(0)?,
            problem_title: row.get(1)?,
            problem_url: row.get(2)?,
            contest_id: row.get(3)?,
            contest_title: row.get(4)?,
            start_at: row.get(5)?,
            duration: row.get(6)?,
            rate_change: row.get(7)?,
            category: row.get(8)?,
            html: row.get(9)?,
            difficulty: row.get(10)?,
            is_experimental: row.get(11)?,
        })
    }
}

impl StoredRow for UserRow {
    const QUERY: &'static str = r#"
        SELECT
            user_name, rating, highest_rating, affiliation, birth_year, country,
            crown, join_count, rank, active_rank, wins
        FROM users
    "#;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_name: row.get(0)?,
            rating: row.get(1)?,
            highest_rating: row.get(2)?,
            affiliation: row.get(3)?,
            birth_year: row.get(4)?,
            country: row.get(5)?,
            crown: row.get(6)?,
            join_count: row.get(7)?,
            rank: row.get(8)?,
            active_rank: row.get(9)?,
            wins: row.get(10)?,
        })
    }
}

impl StoredRow for SubmissionRow {
    const QUERY: &'static str = r#"
        SELECT
            s.id, s.epoch_second, s.problem_id, COALESCE(p.title, ''),
            s.contest_id, COALESCE(c.title, ''), COALESCE(c.category, ''),
            d.difficulty, s.user_id, s.language, s.point, s.length, s.result,
            s.execution_time
        FROM submissions AS s
        LEFT JOIN contests AS c ON s.contest_id = c.contest_id
        LEFT JOIN problems AS p ON s.problem_id = p.problem_id
        LEFT JOIN difficulties AS d ON s.problem_id = d.problem_id
    "#;

    const SINCE_COLUMN: Option<&'static str> = Some("s.crawled_at");

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            epoch_second: row.get(1)?,
            problem_id: row.get(2)?,
            problem_title: row.get(3)?,
            contest_id: row.get(4)?,
            contest_title: row.get(5)?,
            category: row.get(6)?,
            difficulty: row.get(7)?,
            user_id: row.get(8)?,
            language: row.get(9)?,
            point: row.get(10)?,
            length: row.get(11)?,
            result: row.get(12)?,
            execution_time: row.get(13)?,
        })
    }
}

/// SQL and bound timestamp for `filter` applied to `R`.
fn select_sql<R: StoredRow>(filter: &RowFilter) -> (String, Option<i64>) {
    match (R::SINCE_COLUMN, filter.since) {
        (Some(column), Some(since)) => (
            format!("{} WHERE {} >= ?1", R::QUERY.trim_end(), column),
            Some(to_millis(since)),
        ),
        _ => (R::QUERY.to_string(), None),
    }
}

#[async_trait]
impl<R: StoredRow> RowSource<R> for SqliteStore {
    async fn read_rows(
        &self,
        filter: &RowFilter,
        token: CancellationToken,
        tx: mpsc::Sender<R>,
    ) -> Result<usize> {
        let (sql, since) = select_sql::<R>(filter);

        // `tx` is moved into the closure and dropped on every return path,
        // which closes the row channel.
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = match since {
                Some(since) => stmt.query([since])?,
                None => stmt.query([])?,
            };

            let mut sent = 0;
            while let Some(row) = rows.next()? {
                if token.is_cancelled() {
                    log::info!("Row reading cancelled after {} rows", sent);
                    return Ok(sent);
                }
                let item = R::from_row(row)?;
                if tx.blocking_send(item).is_err() {
                    log::debug!("Row channel closed after {} rows", sent);
                    return Ok(sent);
                }
                sent += 1;
            }
            log::info!("Read {} rows", sent);
            Ok(sent)
        })
        .await
    }
}
