//! Client for the external news-search API: the raw-record producer the
//! ingestion pipeline consumes.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;

pub const CRATE_NAME: &str = "newsdesk-client";

/// Curated provider source ids sent with every search request.
pub const DEFAULT_SOURCES: &[&str] = &[
    "abc-news",
    "bloomberg",
    "cbs-news",
    "cnn",
    "fox-news",
    "google-news",
    "msnbc",
    "nbc-news",
    "newsweek",
    "the-hill",
    "the-huffington-post",
    "the-next-web",
    "the-wall-street-journal",
    "the-washington-post",
    "the-washington-times",
    "usa-today",
];

/// Any of these fails the whole ingestion cycle; nothing is recorded.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to news source failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("news source returned http {status} for {url}")]
    Status { status: u16, url: String },
    #[error("could not decode news source payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Raw article record as the provider ships it. Normalization into the
/// stored shape happens in the ingestion pipeline, not here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    #[serde(default)]
    pub source: RawSource,
    pub author: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub url_to_image: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[allow(dead_code)]
    status: String,
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

/// Seam between the pipeline and the provider; implemented by
/// [`NewsApiClient`] in production and by scripted doubles in tests.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_articles(
        &self,
        query: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawArticle>, SourceError>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("NEWS_API_KEY").context("NEWS_API_KEY is not set")?;
        let base_url = std::env::var("NEWS_API_BASE_URL")
            .unwrap_or_else(|_| "https://newsapi.org/v2".to_string());
        let timeout_secs = std::env::var("NEWSDESK_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);
        Ok(Self {
            api_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    sources: Vec<String>,
}

impl NewsApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url,
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

#[async_trait]
impl ArticleSource for NewsApiClient {
    async fn fetch_articles(
        &self,
        query: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawArticle>, SourceError> {
        let url = format!("{}/everything", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("qInTitle", query.to_string()),
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
                ("language", "en".to_string()),
                ("sortBy", "relevancy".to_string()),
                ("pageSize", "100".to_string()),
                ("sources", self.sources.join(",")),
                ("apiKey", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // The provider answers 426 when the requested window reaches
            // further back than the plan allows.
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        let body = response.bytes().await?;
        let parsed: SearchResponse = serde_json::from_slice(&body)?;
        tracing::debug!(
            total = parsed.total_results,
            returned = parsed.articles.len(),
            "search response decoded"
        );
        Ok(parsed.articles)
    }
}
