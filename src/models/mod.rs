// src/models/mod.rs

//! Domain models for the batch pipeline.
//!
//! Remote records (contests, problems, users, submissions), the rows read
//! back from storage, the documents sent to the search index, and the run
//! history record.

mod config;
mod contest;
mod history;
mod problem;
mod submission;
mod user;

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, DatabaseConfig, GenerateConfig, LoggingConfig, SolrConfig,
    UploadConfig,
};
pub use contest::{Contest, ContestCategorizer, RatedTarget};
pub use history::{RunHistory, RunStatus};
pub use problem::{Difficulty, Problem, ProblemDocument, ProblemRow};
pub use submission::{Submission, SubmissionDocument, SubmissionRow};
pub use user::{User, UserDocument, UserRow};

/// An item produced by paginated crawling.
pub trait Crawlable: Clone + Send + Sync + 'static {
    /// Identifier used to drop duplicates and already-stored items
    type Key: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static;

    fn key(&self) -> Self::Key;

    /// Epoch second the remote source orders pages by, if any.
    fn timestamp(&self) -> Option<i64>;
}

/// The three indexed domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Problem,
    User,
    Submission,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Problem, Domain::User, Domain::Submission];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Problem => "problem",
            Domain::User => "user",
            Domain::Submission => "submission",
        }
    }

    /// Run history name for a crawl of this domain.
    pub fn crawl_history_name(&self) -> String {
        format!("crawl-{}", self.as_str())
    }

    /// Run history name for a generate + upload of this domain.
    pub fn update_history_name(&self) -> String {
        format!("update-{}", self.as_str())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "problem" => Ok(Domain::Problem),
            "user" => Ok(Domain::User),
            "submission" => Ok(Domain::Submission),
            other => Err(AppError::validation(format!("unknown domain '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse() {
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>().unwrap(), domain);
        }
        assert!("contest".parse::<Domain>().is_err());
    }

    #[test]
    fn test_history_names() {
        assert_eq!(Domain::Submission.update_history_name(), "update-submission");
        assert_eq!(Domain::User.crawl_history_name(), "crawl-user");
    }
}
