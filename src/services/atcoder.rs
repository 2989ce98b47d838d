// src/services/atcoder.rs

//! atcoder.jp client: login, submission lists, rankings and task pages.

use regex::Regex;
use reqwest::{Client, StatusCode};
use url::Url;

use super::scrape::PageScraper;
use crate::error::{AppError, Result};
use crate::models::{Submission, User};
use crate::utils::http::{check_status, classify_send_error, fetch_text};

const ATCODER_URL: &str = "https://atcoder.jp/";

/// Scraping client for atcoder.jp.
///
/// The underlying `reqwest::Client` must have a cookie store so the session
/// established by [`AtCoderClient::login`] is kept.
pub struct AtCoderClient {
    client: Client,
    base: Url,
    scraper: PageScraper,
    csrf: Regex,
}

impl AtCoderClient {
    pub fn new(client: Client) -> Result<Self> {
        Self::with_base_url(client, ATCODER_URL)
    }

    /// Client against another host, used with local fixtures.
    pub fn with_base_url(client: Client, base: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: Url::parse(base)?,
            scraper: PageScraper::new()?,
            csrf: Regex::new(r#"var csrfToken = "(.+)""#)
                .map_err(|e| AppError::config(format!("invalid csrf pattern: {e}")))?,
        })
    }

    /// Log in with a username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let url = self.base.join("login")?;
        let page = fetch_text(&self.client, url.as_str(), "login page").await?;
        let token = self
            .csrf
            .captures(&page)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| AppError::fetch("login", "csrf token not found on login page"))?;

        let response = self
            .client
            .post(url)
            .form(&[
                ("username", username),
                ("password", password),
                ("csrf_token", token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_send_error("login", e))?;
        let response = check_status("login", response)?;

        // A failed login redirects back to the login form.
        if response.url().path().trim_end_matches('/') == "/login" {
            return Err(AppError::fetch("login", "authentication rejected"));
        }
        log::info!("Logged in to AtCoder as {}", username);
        Ok(())
    }

    /// One page of a contest's submission list; a missing contest yields no rows.
    pub async fn fetch_submissions(&self, contest_id: &str, page: u32) -> Result<Vec<Submission>> {
        let mut url = self.base.join(&format!("contests/{contest_id}/submissions"))?;
        url.set_query(Some(&format!("page={page}")));
        let context = format!("submissions of {contest_id} page {page}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_send_error(&context, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            log::warn!("Contest {} has no submission list", contest_id);
            return Ok(Vec::new());
        }
        let html = check_status(&context, response)?
            .text()
            .await
            .map_err(|e| classify_send_error(&context, e))?;

        let mut submissions = self
            .scraper
            .submissions(&html)
            .map_err(|e| AppError::fetch(&context, e))?;
        for s in &mut submissions {
            s.contest_id = contest_id.to_string();
        }
        Ok(submissions)
    }

    /// One page of the algorithm ranking.
    pub async fn fetch_users(&self, page: u32) -> Result<Vec<User>> {
        let mut url = self.base.join("ranking/all")?;
        url.set_query(Some(&format!("contestType=algo&page={page}")));
        let context = format!("ranking page {page}");

        let html = fetch_text(&self.client, url.as_str(), &context).await?;
        self.scraper
            .users(&html)
            .map_err(|e| AppError::fetch(&context, e))
    }

    /// Task page HTML including both statement languages.
    pub async fn fetch_problem_html(&self, contest_id: &str, problem_id: &str) -> Result<String> {
        let url = self
            .base
            .join(&format!("contests/{contest_id}/tasks/{problem_id}"))?;
        fetch_text(&self.client, url.as_str(), &format!("problem {problem_id}")).await
    }
}
