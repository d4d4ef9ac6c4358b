//! Search provider trait and the Brave Search backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// A single search hit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Age or publication date, if the engine reports one.
    pub published_date: Option<String>,
}

/// Response from a search query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query as the engine understood it.
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// A web search engine.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Execute a search query, returning at most `max_results` hits.
    ///
    /// # Errors
    ///
    /// Returns an error if the search request fails.
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResponse>;

    /// Get the provider name for logging/debugging.
    fn provider_name(&self) -> &'static str;
}

/// Brave Search API provider.
///
/// Requires an API key from <https://brave.com/search/api/>.
#[derive(Clone)]
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl BraveSearchProvider {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: BRAVE_SEARCH_URL.to_string(),
        }
    }

    /// Point the provider at a different endpoint (proxies, tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Brave Search API response structures
mod brave_api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct BraveSearchResponse {
        pub query: Option<BraveQuery>,
        pub web: Option<BraveWebResults>,
    }

    #[derive(Debug, Deserialize)]
    pub struct BraveQuery {
        pub original: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct BraveWebResults {
        pub results: Vec<BraveWebResult>,
    }

    #[derive(Debug, Deserialize)]
    pub struct BraveWebResult {
        pub title: String,
        pub url: String,
        pub description: Option<String>,
        pub age: Option<String>,
    }
}

#[async_trait]
impl SearchProvider for BraveSearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResponse> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &max_results.to_string())])
            .send()
            .await
            .context("Failed to send request to Brave Search API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Brave Search API error: {status} - {body}");
        }

        let brave_response: brave_api::BraveSearchResponse = response
            .json()
            .await
            .context("Failed to parse Brave Search API response")?;

        let results = brave_response
            .web
            .map(|web| {
                web.results
                    .into_iter()
                    .take(max_results)
                    .map(|r| SearchResult {
                        title: r.title,
                        url: r.url,
                        snippet: r.description.unwrap_or_default(),
                        published_date: r.age,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let query = brave_response
            .query
            .map_or_else(|| query.to_string(), |q| q.original);

        Ok(SearchResponse { query, results })
    }

    fn provider_name(&self) -> &'static str {
        "brave"
    }
}
