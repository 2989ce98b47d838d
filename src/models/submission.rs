//! Submission records and the submission search document.

use serde::{Deserialize, Serialize};

use super::Crawlable;

/// One line of a contest's submission list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: i64,
    pub epoch_second: i64,
    pub problem_id: String,
    pub contest_id: String,
    pub user_id: String,
    pub language: String,
    pub point: f64,
    pub length: i64,
    pub result: String,
    /// Missing while the submission is still being judged or on CE
    pub execution_time: Option<i64>,
}

impl Crawlable for Submission {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.epoch_second)
    }
}

/// Stored submission joined with problem, contest and difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRow {
    pub id: i64,
    pub epoch_second: i64,
    pub problem_id: String,
    pub problem_title: String,
    pub contest_id: String,
    pub contest_title: String,
    pub category: String,
    pub difficulty: Option<i64>,
    pub user_id: String,
    pub language: String,
    pub point: f64,
    pub length: i64,
    pub result: String,
    pub execution_time: Option<i64>,
}

/// Document posted to the submission core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionDocument {
    pub submission_id: i64,
    pub epoch_second: i64,
    pub submitted_at: String,
    pub submission_url: String,
    pub problem_id: String,
    pub problem_title: String,
    pub color: String,
    pub difficulty: Option<i64>,
    pub contest_id: String,
    pub contest_title: String,
    pub category: String,
    pub user_id: String,
    pub language: String,
    pub point: f64,
    pub length: i64,
    pub result: String,
    pub execution_time: Option<i64>,
}
