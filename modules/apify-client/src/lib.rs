pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    ApiResponse, ContactItem, ContactScraperInput, OrganicResult, PlaceItem, PlacesSearchInput,
    RunData, SerpPage, SerpSearchInput, StartUrl,
};

use std::time::Duration;

use serde::Serialize;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Hard deadline for the run-start request. Status polls and dataset fetches
/// are bounded by the caller's poll budget instead.
const START_TIMEOUT: Duration = Duration::from_secs(15);

/// Actor ID for the Google Maps places scraper.
pub const PLACES_SCRAPER: &str = "nwua9Gu5YrADL7ZDj";

/// Actor ID for the website contact-details scraper.
pub const CONTACT_SCRAPER: &str = "vdrmO1lXCkhbPjE9j";

/// Actor ID for the Google Search results scraper.
pub const SERP_SCRAPER: &str = "apify/google-search-scraper";

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Start an actor run. Returns immediately with run metadata; poll
    /// `run_status` until the run reaches a terminal state.
    pub async fn start_actor_run<I: Serialize>(
        &self,
        actor_id: &str,
        input: &I,
    ) -> Result<RunData> {
        let url = format!(
            "{}/acts/{}/runs?token={}",
            self.base_url, actor_id, self.token
        );

        tracing::info!(actor_id, "Starting Apify actor run");

        let resp = self
            .client
            .post(&url)
            .timeout(START_TIMEOUT)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: truncate(&body, 300).to_string(),
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Read the current status of an actor run.
    pub async fn run_status(&self, actor_id: &str, run_id: &str) -> Result<RunData> {
        let url = format!(
            "{}/acts/{}/runs/{}?token={}",
            self.base_url, actor_id, run_id, self.token
        );

        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: truncate(&body, 300).to_string(),
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Fetch the items of a dataset as raw JSON. Callers decide how to
    /// deserialize each item; a non-array body is their error to classify.
    pub async fn dataset_items(&self, dataset_id: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/datasets/{}/items?token={}",
            self.base_url, dataset_id, self.token
        );

        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: truncate(&body, 300).to_string(),
            });
        }

        let items: serde_json::Value = resp.json().await?;
        Ok(items)
    }
}

/// Truncate a response body for error messages, at a character boundary.
fn truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}
