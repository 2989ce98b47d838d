//! User crawl over the algorithm ranking.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{CrawlOptions, CrawlReport, Crawler, PageFetcher};
use crate::error::Result;
use crate::models::User;
use crate::services::AtCoderClient;
use crate::storage::CrawlSink;

/// The ranking is a single partition.
pub const USER_PARTITION: &str = "users";

#[async_trait]
impl PageFetcher<User> for AtCoderClient {
    async fn fetch_page(&self, _partition: &str, page: u32) -> Result<Vec<User>> {
        self.fetch_users(page).await
    }
}

pub async fn crawl_users(
    token: &CancellationToken,
    fetcher: &dyn PageFetcher<User>,
    sink: &dyn CrawlSink<User>,
    options: CrawlOptions,
) -> Result<CrawlReport> {
    Crawler::<User>::new(fetcher, sink, options)
        .crawl(token, USER_PARTITION)
        .await
}
