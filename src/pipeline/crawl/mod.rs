// src/pipeline/crawl/mod.rs

//! Paginated crawling of remote listings into storage.
//!
//! A [`Crawler`] walks the pages of one partition (a contest, the ranking)
//! through a [`PageFetcher`] and stores what it found through a
//! [`CrawlSink`]. Domain drivers live in the submodules.

mod problem;
mod submission;
mod user;

pub use problem::{ProblemCatalog, ProblemCrawlReport, ProblemCrawler, ProblemHtmlFetcher};
pub use submission::crawl_submissions;
pub use user::{USER_PARTITION, crawl_users};

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::Crawlable;
use crate::storage::CrawlSink;
use crate::utils::retry::{RetryPolicy, sleep_or_cancel};

/// Items at least this much older than the last crawl start end an
/// incremental crawl. Submissions can be judged well after they were made.
const WATERMARK_MARGIN_SECS: i64 = 86_400;

/// One page of a remote listing.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    /// Items on `page` (1-based) of `partition`. An empty page ends the partition.
    async fn fetch_page(&self, partition: &str, page: u32) -> Result<Vec<T>>;
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlOptions {
    /// Delay after every request
    pub duration: Duration,
    pub retry: RetryPolicy,
    /// Crawl every page instead of stopping at the watermark
    pub all: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    pub pages: u32,
    pub fetched: usize,
    pub saved: usize,
}

pub struct Crawler<'a, T: Crawlable> {
    fetcher: &'a dyn PageFetcher<T>,
    sink: &'a dyn CrawlSink<T>,
    options: CrawlOptions,
}

impl<'a, T: Crawlable> Crawler<'a, T> {
    pub fn new(
        fetcher: &'a dyn PageFetcher<T>,
        sink: &'a dyn CrawlSink<T>,
        options: CrawlOptions,
    ) -> Self {
        Self {
            fetcher,
            sink,
            options,
        }
    }

    /// Crawl `partition` and store the new items in one transaction.
    ///
    /// Nothing is stored when the crawl fails or is cancelled.
    pub async fn crawl(&self, token: &CancellationToken, partition: &str) -> Result<CrawlReport> {
        let started_at = Utc::now();
        let (watermark, existing) = if self.options.all {
            (None, HashSet::new())
        } else {
            (
                self.sink.last_crawled(partition).await?,
                self.sink.existing_ids(partition).await?,
            )
        };
        match watermark {
            Some(at) => log::info!("Crawling {} (last crawled {})", partition, at),
            None => log::info!("Crawling {} from the first page", partition),
        }

        let mut report = CrawlReport::default();
        let mut seen: HashSet<T::Key> = HashSet::new();
        let mut items: Vec<T> = Vec::new();
        let mut previous: Option<i64> = None;

        for page in 1u32.. {
            let context = format!("partition {partition} page {page}");
            let fetched = self
                .options
                .retry
                .run(token, &context, || self.fetcher.fetch_page(partition, page))
                .await
                .map_err(|e| escalate(&context, e))?;
            report.pages = page;
            sleep_or_cancel(token, self.options.duration).await?;

            if fetched.is_empty() {
                log::debug!("{} is empty; {} exhausted", context, partition);
                break;
            }
            report.fetched += fetched.len();

            let first = fetched.first().and_then(|i| i.timestamp());
            if !self.options.all {
                warn_if_not_descending(&context, previous, &fetched);
            }
            previous = fetched.last().and_then(|i| i.timestamp()).or(previous);

            for item in fetched {
                let key = item.key();
                if existing.contains(&key) || !seen.insert(key) {
                    continue;
                }
                items.push(item);
            }

            if let (Some(at), Some(first)) = (watermark, first)
                && first < at.timestamp() - WATERMARK_MARGIN_SECS
            {
                log::info!("{} is older than the last crawl; stopping", context);
                break;
            }
        }

        report.saved = self.sink.save(partition, items, started_at).await?;
        log::info!(
            "Crawled {}: {} pages, {} items fetched, {} saved",
            partition,
            report.pages,
            report.fetched,
            report.saved
        );
        Ok(report)
    }
}

/// Wrap an exhausted or persistent fetch failure with where it happened.
fn escalate(context: &str, error: AppError) -> AppError {
    if error.is_interrupted() {
        error
    } else {
        AppError::fetch(context, error)
    }
}

/// Incremental stopping assumes pages newest first; say so when a page breaks that.
fn warn_if_not_descending<T: Crawlable>(context: &str, previous: Option<i64>, page: &[T]) {
    let mut last = previous;
    for ts in page.iter().filter_map(|i| i.timestamp()) {
        if let Some(prev) = last
            && ts > prev
        {
            log::warn!(
                "{}: timestamps are not descending ({} after {}); the watermark stop may skip items",
                context,
                ts,
                prev
            );
            return;
        }
        last = Some(ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::DateTime;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        at: i64,
    }

    impl Crawlable for Item {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }

        fn timestamp(&self) -> Option<i64> {
            Some(self.at)
        }
    }

    struct Pages(Vec<Vec<Item>>);

    #[async_trait]
    impl PageFetcher<Item> for Pages {
        async fn fetch_page(&self, _partition: &str, page: u32) -> Result<Vec<Item>> {
            Ok(self.0.get(page as usize - 1).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        watermark: Option<DateTime<Utc>>,
        existing: HashSet<u32>,
        saved: Mutex<HashMap<String, Vec<Item>>>,
    }

    #[async_trait]
    impl CrawlSink<Item> for MemorySink {
        async fn last_crawled(&self, _partition: &str) -> Result<Option<DateTime<Utc>>> {
            Ok(self.watermark)
        }

        async fn existing_ids(&self, _partition: &str) -> Result<HashSet<u32>> {
            Ok(self.existing.clone())
        }

        async fn save(&self, partition: &str, items: Vec<Item>, _at: DateTime<Utc>) -> Result<usize> {
            let n = items.len();
            self.saved.lock().unwrap().insert(partition.to_string(), items);
            Ok(n)
        }
    }

    fn options(all: bool) -> CrawlOptions {
        CrawlOptions {
            duration: Duration::ZERO,
            retry: RetryPolicy::new(3, Duration::ZERO),
            all,
        }
    }

    fn item(id: u32, at: i64) -> Item {
        Item { id, at }
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_dropped() {
        let pages = Pages(vec![
            vec![item(3, 300), item(2, 200)],
            vec![item(2, 200), item(1, 100)],
        ]);
        let sink = MemorySink::default();
        let report = Crawler::<Item>::new(&pages, &sink, options(false))
            .crawl(&CancellationToken::new(), "abc001")
            .await
            .unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.fetched, 4);
        assert_eq!(report.saved, 3);
    }

    #[tokio::test]
    async fn test_incremental_skips_existing_ids() {
        let pages = Pages(vec![vec![item(3, 300), item(2, 200), item(1, 100)]]);
        let sink = MemorySink {
            existing: HashSet::from([1, 2]),
            ..MemorySink::default()
        };
        Crawler::<Item>::new(&pages, &sink, options(false))
            .crawl(&CancellationToken::new(), "abc001")
            .await
            .unwrap();

        assert_eq!(sink.saved.lock().unwrap()["abc001"], vec![item(3, 300)]);
    }

    #[tokio::test]
    async fn test_all_mode_ignores_existing_ids() {
        let pages = Pages(vec![vec![item(2, 200), item(1, 100)]]);
        let sink = MemorySink {
            existing: HashSet::from([1, 2]),
            ..MemorySink::default()
        };
        let report = Crawler::<Item>::new(&pages, &sink, options(true))
            .crawl(&CancellationToken::new(), "abc001")
            .await
            .unwrap();

        assert_eq!(report.saved, 2);
    }

    #[test]
    fn test_descending_check_accepts_ties() {
        // only logs; exercised for panics on edge input
        warn_if_not_descending::<Item>("p", None, &[]);
        warn_if_not_descending("p", Some(100), &[item(1, 100), item(2, 100)]);
        warn_if_not_descending("p", Some(100), &[item(1, 200)]);
    }

    fn watermarked(at: i64) -> MemorySink {
        MemorySink {
            watermark: DateTime::from_timestamp(at, 0),
            ..MemorySink::default()
        }
    }

    #[tokio::test]
    async fn test_page_within_margin_keeps_paging() {
        let last = 1_700_000_000;
        let pages = Pages(vec![
            vec![item(2, last - WATERMARK_MARGIN_SECS)],
            vec![item(1, last - WATERMARK_MARGIN_SECS - 3600)],
        ]);
        let report = Crawler::<Item>::new(&pages, &watermarked(last), options(false))
            .crawl(&CancellationToken::new(), "abc001")
            .await
            .unwrap();

        // page 1 sits exactly on the margin; page 2 is past it and ends the crawl
        assert_eq!(report.pages, 2);
        assert_eq!(report.saved, 2);
    }

    #[tokio::test]
    async fn test_page_past_margin_stops_paging() {
        let last = 1_700_000_000;
        let pages = Pages(vec![
            vec![item(2, last - WATERMARK_MARGIN_SECS - 1)],
            vec![item(1, last - WATERMARK_MARGIN_SECS - 3600)],
        ]);
        let report = Crawler::<Item>::new(&pages, &watermarked(last), options(false))
            .crawl(&CancellationToken::new(), "abc001")
            .await
            .unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.saved, 1);
    }

    struct Hung;

    #[async_trait]
    impl PageFetcher<Item> for Hung {
        async fn fetch_page(&self, _partition: &str, _page: u32) -> Result<Vec<Item>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_hung_fetch() {
        let sink = MemorySink::default();
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel();
            })
        };

        let crawler = Crawler::<Item>::new(&Hung, &sink, options(false));
        let err = tokio::time::timeout(Duration::from_secs(5), crawler.crawl(&token, "abc001"))
            .await
            .expect("crawl did not observe cancellation")
            .unwrap_err();

        assert!(err.is_interrupted());
        assert!(sink.saved.lock().unwrap().is_empty());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_crawl_saves_nothing() {
        let pages = Pages(vec![vec![item(1, 100)]]);
        let sink = MemorySink::default();
        let token = CancellationToken::new();
        token.cancel();

        let err = Crawler::<Item>::new(&pages, &sink, options(false))
            .crawl(&token, "abc001")
            .await
            .unwrap_err();

        assert!(err.is_interrupted());
        assert!(sink.saved.lock().unwrap().is_empty());
    }
}
