//! Web search.
//!
//! - [`WebSearchTool`] - The `web_search` tool the model calls
//! - [`SearchProvider`] - Pluggable search engine
//! - [`BraveSearchProvider`] - Brave Search API integration

pub mod provider;
pub mod search;

pub use provider::{BraveSearchProvider, SearchProvider, SearchResponse, SearchResult};
pub use search::WebSearchTool;
