//! Storage abstractions for crawled rows and run history.
//!
//! The crawler writes through [`CrawlSink`], document generation reads back
//! through [`StoredRow`] queries, and batch runs are recorded with
//! [`HistoryStore`]. [`SqliteStore`] implements all of them on one database.
//!
//! ## Tables
//!
//! ```text
//! contests         # AtCoder Problems contest list with assigned category
//! problems         # problem metadata and statement HTML
//! difficulties     # estimated difficulty per problem
//! users            # ranking snapshot, upserted by user name
//! submissions      # submission lists, crawled_at marks the crawl that stored them
//! crawl_watermarks # last crawl start per (domain, partition)
//! run_history      # one record per batch run
//! ```

mod rows;
mod schema;
pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Crawlable, RunHistory};

// Re-export for convenience
pub use sqlite::SqliteStore;

/// Persistence of batch run records.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a new record in the `working` state.
    async fn create_history(&self, name: &str, options: serde_json::Value) -> Result<RunHistory>;

    /// Persist a terminal transition.
    ///
    /// Fails with `AlreadyConfirmed` if the stored record is no longer
    /// `working`; the stored record is left untouched in that case.
    async fn confirm_history(&self, history: &RunHistory) -> Result<()>;

    /// Most recent `finished` run with the given name.
    async fn latest_finished(&self, name: &str) -> Result<Option<RunHistory>>;
}

/// Storage side of a paginated crawl.
#[async_trait]
pub trait CrawlSink<T: Crawlable>: Send + Sync {
    /// Start time of the last successful crawl of `partition`.
    async fn last_crawled(&self, partition: &str) -> Result<Option<DateTime<Utc>>>;

    /// Keys already stored for `partition`; these are skipped in incremental mode.
    async fn existing_ids(&self, partition: &str) -> Result<HashSet<T::Key>>;

    /// Store `items` and advance the watermark to `crawled_at` in one transaction.
    async fn save(&self, partition: &str, items: Vec<T>, crawled_at: DateTime<Utc>)
    -> Result<usize>;
}

/// A row type that can be read back for document generation.
pub trait StoredRow: Sized + Send + 'static {
    /// SELECT without WHERE or ORDER BY clauses
    const QUERY: &'static str;

    /// Column compared against [`RowFilter::since`], in the same unit as
    /// `crawled_at` (epoch milliseconds).
    const SINCE_COLUMN: Option<&'static str> = None;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

/// Restriction applied when streaming stored rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Only rows stored at or after this instant; ignored by row types
    /// without a `SINCE_COLUMN`
    pub since: Option<DateTime<Utc>>,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(at: DateTime<Utc>) -> Self {
        Self { since: Some(at) }
    }
}
