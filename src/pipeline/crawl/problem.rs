//! Problem crawl: contest and difficulty datasets, then one task page per
//! problem not stored yet.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{CrawlOptions, escalate};
use crate::error::Result;
use crate::models::{Contest, ContestCategorizer, Difficulty, Problem};
use crate::services::{AtCoderClient, AtCoderProblemsClient};
use crate::storage::SqliteStore;
use crate::utils::retry::sleep_or_cancel;

/// Source of the contest, problem and difficulty datasets.
#[async_trait]
pub trait ProblemCatalog: Send + Sync {
    async fn fetch_contests(&self) -> Result<Vec<Contest>>;
    async fn fetch_problems(&self) -> Result<Vec<Problem>>;
    async fn fetch_difficulties(&self) -> Result<HashMap<String, Difficulty>>;
}

/// Source of task page HTML.
#[async_trait]
pub trait ProblemHtmlFetcher: Send + Sync {
    async fn fetch_problem_html(&self, contest_id: &str, problem_id: &str) -> Result<String>;
}

#[async_trait]
impl ProblemCatalog for AtCoderProblemsClient {
    async fn fetch_contests(&self) -> Result<Vec<Contest>> {
        AtCoderProblemsClient::fetch_contests(self).await
    }

    async fn fetch_problems(&self) -> Result<Vec<Problem>> {
        AtCoderProblemsClient::fetch_problems(self).await
    }

    async fn fetch_difficulties(&self) -> Result<HashMap<String, Difficulty>> {
        AtCoderProblemsClient::fetch_difficulties(self).await
    }
}

#[async_trait]
impl ProblemHtmlFetcher for AtCoderClient {
    async fn fetch_problem_html(&self, contest_id: &str, problem_id: &str) -> Result<String> {
        AtCoderClient::fetch_problem_html(self, contest_id, problem_id).await
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProblemCrawlReport {
    pub contests: usize,
    pub difficulties: usize,
    /// Problems whose task page was fetched and stored
    pub problems: usize,
}

pub struct ProblemCrawler<'a> {
    catalog: &'a dyn ProblemCatalog,
    pages: &'a dyn ProblemHtmlFetcher,
    store: &'a SqliteStore,
    categorizer: ContestCategorizer,
    options: CrawlOptions,
}

impl<'a> ProblemCrawler<'a> {
    pub fn new(
        catalog: &'a dyn ProblemCatalog,
        pages: &'a dyn ProblemHtmlFetcher,
        store: &'a SqliteStore,
        options: CrawlOptions,
    ) -> Result<Self> {
        Ok(Self {
            catalog,
            pages,
            store,
            categorizer: ContestCategorizer::new()?,
            options,
        })
    }

    pub async fn crawl(&self, token: &CancellationToken) -> Result<ProblemCrawlReport> {
        let retry = self.options.retry;
        let (contests, difficulties) = futures::try_join!(
            retry.run(token, "contests", || self.catalog.fetch_contests()),
            retry.run(token, "difficulties", || self.catalog.fetch_difficulties()),
        )
        .map_err(|e| escalate("problem datasets", e))?;

        let categorized: Vec<(Contest, String)> = contests
            .into_iter()
            .map(|c| {
                let category = self.categorizer.categorize(&c).to_string();
                (c, category)
            })
            .collect();
        let mut report = ProblemCrawlReport {
            contests: self.store.upsert_contests(categorized).await?,
            difficulties: self
                .store
                .upsert_difficulties(difficulties.into_iter().collect())
                .await?,
            problems: 0,
        };
        log::info!(
            "Stored {} contests and {} difficulties",
            report.contests,
            report.difficulties
        );

        let mut targets = retry
            .run(token, "problems", || self.catalog.fetch_problems())
            .await
            .map_err(|e| escalate("problem list", e))?;
        if !self.options.all {
            let stored = self.store.problem_ids().await?;
            targets.retain(|p| !stored.contains(&p.id));
        }
        log::info!("Crawling {} problems", targets.len());

        for problem in targets {
            let context = format!("problem {}", problem.id);
            let html = retry
                .run(token, &context, || {
                    self.pages
                        .fetch_problem_html(&problem.contest_id, &problem.id)
                })
                .await
                .map_err(|e| escalate(&context, e))?;
            log::debug!("Fetched {} ({} bytes)", context, html.len());

            self.store.save_problem(problem, html).await?;
            report.problems += 1;
            sleep_or_cancel(token, self.options.duration).await?;
        }

        log::info!("Problem crawl finished: {} problems stored", report.problems);
        Ok(report)
    }
}
