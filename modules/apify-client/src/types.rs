use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

// --- Google Maps places scraper types ---

/// Input for the Google Maps places scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct PlacesSearchInput {
    #[serde(rename = "searchStringsArray")]
    pub search_strings_array: Vec<String>,
    #[serde(rename = "maxCrawledPlacesPerSearch")]
    pub max_crawled_places_per_search: u32,
    pub language: String,
    #[serde(rename = "includeWebsiteEmail")]
    pub include_website_email: bool,
    #[serde(rename = "scrapeContacts")]
    pub scrape_contacts: bool,
    #[serde(rename = "maxImages")]
    pub max_images: u32,
    #[serde(rename = "maxReviews")]
    pub max_reviews: u32,
}

/// A single business listing from the places scraper dataset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceItem {
    #[serde(rename = "placeId")]
    pub place_id: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "fullAddress")]
    pub full_address: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    #[serde(rename = "categoryName")]
    pub category_name: Option<String>,
    #[serde(rename = "reviewsCount")]
    pub reviews_count: Option<i64>,
    #[serde(rename = "totalScore")]
    pub total_score: Option<f64>,
}

impl PlaceItem {
    /// Returns the first known contact email, preferring the scalar field.
    pub fn primary_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.emails.iter().map(String::as_str).find(|s| !s.is_empty()))
    }

    /// Returns the first known phone number, preferring the scalar field.
    pub fn primary_phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.phones.iter().map(String::as_str).find(|s| !s.is_empty()))
    }
}

// --- Website contact scraper types ---

/// A start URL entry for actor inputs that take URL lists.
#[derive(Debug, Clone, Serialize)]
pub struct StartUrl {
    pub url: String,
}

/// Input for the website contact-details scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct ContactScraperInput {
    #[serde(rename = "startUrls")]
    pub start_urls: Vec<StartUrl>,
    #[serde(rename = "maxRequestsPerWebsite")]
    pub max_requests_per_website: u32,
    #[serde(rename = "sameDomainOnly")]
    pub same_domain_only: bool,
}

/// Contact details scraped from one website.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactItem {
    pub domain: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(rename = "linkedIn")]
    pub linked_in: Option<String>,
}

// --- Google Search SERP scraper types ---

/// Input for the Google Search results scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct SerpSearchInput {
    pub queries: String,
    #[serde(rename = "maxPagesPerQuery")]
    pub max_pages_per_query: u32,
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
    #[serde(rename = "languageCode")]
    pub language_code: String,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    #[serde(rename = "mobileResults")]
    pub mobile_results: bool,
}

/// One results page from the SERP scraper dataset. Each dataset item is a
/// page wrapping its organic results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SerpPage {
    #[serde(rename = "organicResults", default)]
    pub organic_results: Vec<OrganicResult>,
}

/// A single organic search result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganicResult {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}
