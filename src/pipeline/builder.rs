// src/pipeline/builder.rs

//! Row to document conversion, one builder per domain.

use serde::Serialize;

use super::extract::StatementExtractor;
use crate::error::{AppError, Result};
use crate::models::{
    ProblemDocument, ProblemRow, SubmissionDocument, SubmissionRow, UserDocument, UserRow,
};
use crate::utils::{difficulty_color, rate_to_color, solr_datetime_from_epoch};

/// Turns exactly one row into exactly one document.
///
/// Builders hold no mutable state and are shared by every converter worker.
pub trait DocumentBuilder: Send + Sync {
    type Row: Send + 'static;
    type Document: Serialize + Send + 'static;

    fn build(&self, row: Self::Row) -> Result<Self::Document>;
}

pub struct ProblemBuilder {
    extractor: StatementExtractor,
}

impl ProblemBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            extractor: StatementExtractor::new()?,
        })
    }
}

impl DocumentBuilder for ProblemBuilder {
    type Row = ProblemRow;
    type Document = ProblemDocument;

    fn build(&self, row: ProblemRow) -> Result<ProblemDocument> {
        if row.html.trim().is_empty() {
            return Err(AppError::build(&row.problem_id, "no statement HTML stored"));
        }
        let statements = self.extractor.extract(&row.html);

        Ok(ProblemDocument {
            contest_url: format!("https://atcoder.jp/contests/{}", row.contest_id),
            color: difficulty_color(row.difficulty).to_string(),
            start_at: solr_datetime_from_epoch(row.start_at),
            problem_id: row.problem_id,
            problem_title: row.problem_title,
            problem_url: row.problem_url,
            contest_id: row.contest_id,
            contest_title: row.contest_title,
            difficulty: row.difficulty,
            is_experimental: row.is_experimental,
            duration: row.duration,
            rate_change: row.rate_change,
            category: row.category,
            statement_ja: statements.ja,
            statement_en: statements.en,
        })
    }
}

pub struct UserBuilder;

impl DocumentBuilder for UserBuilder {
    type Row = UserRow;
    type Document = UserDocument;

    fn build(&self, row: UserRow) -> Result<UserDocument> {
        if row.user_name.is_empty() {
            return Err(AppError::build("user", "empty user name"));
        }

        Ok(UserDocument {
            color: rate_to_color(row.rating).to_string(),
            highest_color: rate_to_color(row.highest_rating).to_string(),
            user_url: format!("https://atcoder.jp/users/{}", row.user_name),
            user_name: row.user_name,
            rating: row.rating,
            highest_rating: row.highest_rating,
            affiliation: row.affiliation,
            birth_year: row.birth_year,
            country: row.country,
            crown: row.crown,
            join_count: row.join_count,
            rank: row.rank,
            active_rank: row.active_rank,
            wins: row.wins,
        })
    }
}

pub struct SubmissionBuilder;

impl DocumentBuilder for SubmissionBuilder {
    type Row = SubmissionRow;
    type Document = SubmissionDocument;

    fn build(&self, row: SubmissionRow) -> Result<SubmissionDocument> {
        Ok(SubmissionDocument {
            submission_id: row.id,
            epoch_second: row.epoch_second,
            submitted_at: solr_datetime_from_epoch(row.epoch_second),
            submission_url: format!(
                "https://atcoder.jp/contests/{}/submissions/{}",
                row.contest_id, row.id
            ),
            color: difficulty_color(row.difficulty).to_string(),
            problem_id: row.problem_id,
            problem_title: row.problem_title,
            difficulty: row.difficulty,
            contest_id: row.contest_id,
            contest_title: row.contest_title,
            category: row.category,
            user_id: row.user_id,
            language: row.language,
            point: row.point,
            length: row.length,
            result: row.result,
            execution_time: row.execution_time,
        })
    }
}
