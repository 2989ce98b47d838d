// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, Result, is_transient_http, is_transient_status};
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
///
/// The cookie store keeps the AtCoder session after `login`.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .cookie_store(true)
        .build()?;
    Ok(client)
}

/// Turn a send failure into a transient or persistent fetch error.
pub fn classify_send_error(context: &str, error: reqwest::Error) -> AppError {
    if is_transient_http(&error) {
        AppError::transient(context, error)
    } else {
        AppError::fetch(context, error)
    }
}

/// Reject non-2xx responses, classifying them by status.
pub fn check_status(context: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = format!("unexpected status {status} from {}", response.url());
    if is_transient_status(status) {
        Err(AppError::transient(context, message))
    } else {
        Err(AppError::fetch(context, message))
    }
}

/// GET a page and return its body text.
pub async fn fetch_text(client: &reqwest::Client, url: &str, context: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_send_error(context, e))?;
    let response = check_status(context, response)?;
    response
        .text()
        .await
        .map_err(|e| classify_send_error(context, e))
}
