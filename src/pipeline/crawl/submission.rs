//! Submission crawl: one partition per contest, newest contests first.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{CrawlOptions, CrawlReport, Crawler, PageFetcher};
use crate::error::Result;
use crate::models::Submission;
use crate::services::AtCoderClient;
use crate::storage::SqliteStore;

#[async_trait]
impl PageFetcher<Submission> for AtCoderClient {
    async fn fetch_page(&self, contest_id: &str, page: u32) -> Result<Vec<Submission>> {
        self.fetch_submissions(contest_id, page).await
    }
}

/// Crawl the submissions of every stored contest in `categories` (all
/// contests when empty).
///
/// Contests are crawled one after another; the first failing contest ends
/// the crawl, keeping what earlier contests stored.
pub async fn crawl_submissions(
    token: &CancellationToken,
    fetcher: &dyn PageFetcher<Submission>,
    store: &SqliteStore,
    categories: Vec<String>,
    options: CrawlOptions,
) -> Result<CrawlReport> {
    let contests = store.contest_ids(categories).await?;
    log::info!("Crawling submissions of {} contests", contests.len());

    let crawler = Crawler::<Submission>::new(fetcher, store, options);
    let mut total = CrawlReport::default();
    for contest_id in &contests {
        let report = crawler.crawl(token, contest_id).await?;
        total.pages += report.pages;
        total.fetched += report.fetched;
        total.saved += report.saved;
    }

    log::info!(
        "Submission crawl finished: {} contests, {} pages, {} saved",
        contests.len(),
        total.pages,
        total.saved
    );
    Ok(total)
}
