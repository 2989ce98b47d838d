//! Ranked user and the user search document.

use serde::{Deserialize, Serialize};

use super::Crawlable;

/// One line of the AtCoder ranking.
///
/// The scraped record is stored as is, so it also serves as the row read
/// back for document generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_name: String,
    pub rating: i64,
    pub highest_rating: i64,
    pub affiliation: Option<String>,
    pub birth_year: Option<i64>,
    pub country: Option<String>,
    pub crown: Option<String>,
    pub join_count: i64,
    pub rank: i64,
    pub active_rank: Option<i64>,
    pub wins: i64,
}

/// Row type for user document generation.
pub type UserRow = User;

impl Crawlable for User {
    type Key = String;

    fn key(&self) -> String {
        self.user_name.clone()
    }

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Document posted to the user core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDocument {
    pub user_name: String,
    pub rating: i64,
    pub highest_rating: i64,
    pub affiliation: Option<String>,
    pub birth_year: Option<i64>,
    pub country: Option<String>,
    pub crown: Option<String>,
    pub join_count: i64,
    pub rank: i64,
    pub active_rank: Option<i64>,
    pub wins: i64,
    pub color: String,
    pub highest_color: String,
    pub user_url: String,
}
