// src/services/problems.rs

//! AtCoder Problems resource client.

use std::collections::HashMap;

use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Result;
use crate::models::{Contest, Difficulty, Problem};
use crate::utils::http::{check_status, classify_send_error};

const RESOURCES_URL: &str = "https://kenkoooo.com/atcoder/resources/";

/// JSON client for the public AtCoder Problems datasets.
pub struct AtCoderProblemsClient {
    client: Client,
    base: Url,
}

impl AtCoderProblemsClient {
    pub fn new(client: Client) -> Result<Self> {
        Self::with_base_url(client, RESOURCES_URL)
    }

    pub fn with_base_url(client: Client, base: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: Url::parse(base)?,
        })
    }

    pub async fn fetch_contests(&self) -> Result<Vec<Contest>> {
        self.get_json("contests.json").await
    }

    pub async fn fetch_problems(&self) -> Result<Vec<Problem>> {
        self.get_json("problems.json").await
    }

    /// Difficulty models keyed by problem id.
    pub async fn fetch_difficulties(&self) -> Result<HashMap<String, Difficulty>> {
        self.get_json("problem-models.json").await
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &str) -> Result<T> {
        let url = self.base.join(resource)?;
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_send_error(resource, e))?;
        check_status(resource, response)?
            .json::<T>()
            .await
            .map_err(|e| classify_send_error(resource, e))
    }
}
