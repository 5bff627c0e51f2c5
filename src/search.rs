//! Query execution against the search index.
//!
//! [`QueryExecutor`] turns caller parameters into one [`SearchQuery`],
//! validating everything that can be checked locally before any network
//! call, runs it, and hands the response back with the query text and
//! index name attached. Every execution with non-blank text is submitted
//! to the analytics [`Recorder`] without waiting on it.
//!
//! | Parameter | Default |
//! |-----------|---------|
//! | `indexName` | `[index].name` (`internal_sites`) |
//! | `limit` | `[search].default_limit` (10) |
//! | `offset` | 0 |
//! | `attributesToHighlight` | `name`, `description` |
//! | `attributesToRetrieve` | `id`, `name`, `url`, `description`, `type` |

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::{CallerInfo, Recorder};
use crate::config::Config;
use crate::error::{PortalError, PortalResult};
use crate::index::{is_valid_uid, IndexService};
use crate::models::{SearchQuery, SearchResponse};

pub const DEFAULT_HIGHLIGHT: [&str; 2] = ["name", "description"];
pub const DEFAULT_RETRIEVE: [&str; 5] = ["id", "name", "url", "description", "type"];

/// Caller-supplied search parameters; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub sort: Option<Vec<String>>,
    #[serde(default)]
    pub facets: Option<Vec<String>>,
    #[serde(default)]
    pub attributes_to_highlight: Option<Vec<String>>,
    #[serde(default)]
    pub attributes_to_retrieve: Option<Vec<String>>,
}

/// A search response with the request's text and index echoed back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub query: String,
    pub index_name: String,
    #[serde(flatten)]
    pub response: SearchResponse,
}

pub struct QueryExecutor {
    index: Arc<dyn IndexService>,
    recorder: Option<Recorder>,
    default_index: String,
    default_limit: usize,
    max_limit: usize,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl QueryExecutor {
    pub fn new(index: Arc<dyn IndexService>, recorder: Option<Recorder>, config: &Config) -> Self {
        Self {
            index,
            recorder,
            default_index: config.index.name.clone(),
            default_limit: config.search.default_limit,
            max_limit: config.search.max_limit,
        }
    }

    /// Resolve defaults and validate. Returns the target index and query.
    pub fn build(&self, params: &SearchParams) -> PortalResult<(String, SearchQuery)> {
        let index_name = params
            .index_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_index)
            .to_string();
        if !is_valid_uid(&index_name) {
            return Err(PortalError::validation(format!(
                "Invalid index name '{}'",
                index_name
            )));
        }

        let limit = params.limit.unwrap_or(self.default_limit);
        if limit > self.max_limit {
            return Err(PortalError::validation(format!(
                "limit must be at most {}",
                self.max_limit
            )));
        }

        let query = SearchQuery {
            text: params.query.clone().unwrap_or_default(),
            limit,
            offset: params.offset.unwrap_or(0),
            filter: params
                .filter
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
            sort: params.sort.clone().filter(|s| !s.is_empty()),
            facets: params.facets.clone().filter(|f| !f.is_empty()),
            attributes_to_highlight: params
                .attributes_to_highlight
                .clone()
                .unwrap_or_else(|| owned(&DEFAULT_HIGHLIGHT)),
            attributes_to_retrieve: params
                .attributes_to_retrieve
                .clone()
                .unwrap_or_else(|| owned(&DEFAULT_RETRIEVE)),
        };

        Ok((index_name, query))
    }

    /// Run a committed search and record it.
    pub async fn execute(&self, params: &SearchParams, caller: &CallerInfo) -> PortalResult<SearchOutcome> {
        let outcome = self.run(params).await?;
        if let Some(recorder) = &self.recorder {
            recorder.record(&outcome.query, outcome.response.estimated_total_hits, caller);
        }
        Ok(outcome)
    }

    /// Run a search without recording analytics.
    pub async fn execute_untracked(&self, params: &SearchParams) -> PortalResult<SearchOutcome> {
        self.run(params).await
    }

    async fn run(&self, params: &SearchParams) -> PortalResult<SearchOutcome> {
        let (index_name, query) = self.build(params)?;
        let response = self.index.search(&index_name, &query).await?;

        tracing::debug!(
            index = %index_name,
            query = %query.text,
            hits = response.hits.len(),
            total = response.estimated_total_hits,
            "search executed"
        );

        Ok(SearchOutcome {
            query: query.text,
            index_name,
            response,
        })
    }
}

/// Print results for the CLI.
pub fn print_outcome(outcome: &SearchOutcome) {
    let response = &outcome.response;
    if response.hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in response.hits.iter().enumerate() {
        let field = |name: &str| hit.get(name).and_then(|v| v.as_str()).unwrap_or("");
        println!(
            "{}. {} [{}]",
            response.offset + i + 1,
            field("name"),
            field("type")
        );
        println!("    url: {}", field("url"));
        let description = field("description");
        if !description.is_empty() {
            println!("    {}", description);
        }
        println!();
    }

    println!(
        "{} of ~{} results ({} ms)",
        response.hits.len(),
        response.estimated_total_hits,
        response.processing_time_ms
    );
}
