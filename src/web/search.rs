use super::provider::{SearchProvider, SearchResult};
use crate::{Tool, ToolContext, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write;
use std::sync::Arc;

const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_CAP: usize = 10;

/// Web search tool backed by any [`SearchProvider`].
pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    count: Option<usize>,
}

impl WebSearchTool {
    #[must_use]
    pub fn new(provider: impl SearchProvider + 'static) -> Self {
        Self::with_shared_provider(Arc::new(provider))
    }

    #[must_use]
    pub fn with_shared_provider(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Default number of results when the model does not pass `count`.
    #[must_use]
    pub const fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }
}

fn format_search_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results for: {query}");
    }

    let mut output = format!("Results for: {query}\n");
    for (i, result) in results.iter().enumerate() {
        let _ = write!(output, "\n{}. {}\n   {}", i + 1, result.title, result.url);
        if !result.snippet.is_empty() {
            let _ = write!(output, "\n   {}", result.snippet);
        }
        if let Some(date) = &result.published_date {
            let _ = write!(output, "\n   Published: {date}");
        }
    }
    output
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web. Returns titles, URLs, and snippets."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "count": {
                    "type": "integer",
                    "description": "Results (1-10)",
                    "minimum": 1,
                    "maximum": MAX_RESULTS_CAP
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let input: SearchInput =
            serde_json::from_value(input).context("Invalid input for web_search tool")?;

        let count = input
            .count
            .unwrap_or(self.max_results)
            .clamp(1, MAX_RESULTS_CAP);

        log::debug!(
            "Searching via {} (count={count}): {}",
            self.provider.provider_name(),
            input.query
        );

        let response = match self.provider.search(&input.query, count).await {
            Ok(response) => response,
            Err(e) => return Ok(ToolResult::error(format!("Error: {e:#}"))),
        };

        let output = format_search_results(&response.query, &response.results);
        let data = serde_json::to_value(&response).unwrap_or(Value::Null);

        Ok(ToolResult::success_with_data(output, data))
    }
}
