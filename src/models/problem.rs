//! Problem, difficulty model, and the problem search document.

use serde::{Deserialize, Serialize};

/// A problem as listed by AtCoder Problems.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
    pub id: String,
    pub contest_id: String,
    pub problem_index: String,
    pub name: String,
    pub title: String,
}

impl Problem {
    /// Task page on atcoder.jp.
    pub fn url(&self) -> String {
        format!(
            "https://atcoder.jp/contests/{}/tasks/{}",
            self.contest_id, self.id
        )
    }
}

/// Estimated difficulty model for one problem.
///
/// Every field is optional; AtCoder Problems omits whatever it could not fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Difficulty {
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub variance: Option<f64>,
    pub difficulty: Option<i64>,
    pub discrimination: Option<f64>,
    pub irt_loglikelihood: Option<f64>,
    pub irt_users: Option<f64>,
    pub is_experimental: Option<bool>,
}

/// Stored problem joined with its contest and difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemRow {
    pub problem_id: String,
    pub problem_title: String,
    pub problem_url: String,
    pub contest_id: String,
    pub contest_title: String,
    pub start_at: i64,
    pub duration: i64,
    pub rate_change: String,
    pub category: String,
    pub html: String,
    pub difficulty: Option<i64>,
    pub is_experimental: bool,
}

/// Document posted to the problem core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemDocument {
    pub problem_id: String,
    pub problem_title: String,
    pub problem_url: String,
    pub contest_id: String,
    pub contest_title: String,
    pub contest_url: String,
    pub difficulty: Option<i64>,
    pub color: String,
    pub is_experimental: bool,
    pub start_at: String,
    pub duration: i64,
    pub rate_change: String,
    pub category: String,
    pub statement_ja: Vec<String>,
    pub statement_en: Vec<String>,
}
