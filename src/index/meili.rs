//! Meilisearch HTTP client.
//!
//! A thin `reqwest` wrapper over the Meilisearch REST API. All requests
//! carry the configured API key as a bearer token. Error responses
//! (`{"message", "code", "type", "link"}`) are mapped onto [`IndexError`]:
//!
//! | Meilisearch code | Mapped to |
//! |------------------|-----------|
//! | `index_not_found` | [`IndexError::IndexNotFound`] |
//! | `index_already_exists` | [`IndexError::IndexAlreadyExists`] |
//! | `invalid_search_filter` | [`IndexError::InvalidFilter`] |
//! | other `invalid_*` / `missing_*` | [`IndexError::InvalidRequest`] |
//! | anything else, network errors | [`IndexError::Unavailable`] |

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{DocumentsPage, IndexError, IndexInfo, IndexResult, IndexService, IndexStats, Task};
use crate::models::{SearchQuery, SearchResponse};

/// Connection to one Meilisearch server.
pub struct MeiliIndex {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeiliErrorBody {
    message: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    results: Vec<IndexInfo>,
}

impl MeiliIndex {
    /// Build a client for `host` (e.g. `http://localhost:7700`).
    ///
    /// No request is made; an unreachable server surfaces on first use as
    /// [`IndexError::Unavailable`].
    pub fn connect(host: &str, api_key: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let parsed = url::Url::parse(host)
            .with_context(|| format!("Invalid index host URL: {}", host))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Index host must be http or https: {}", host);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self
            .client
            .request(method, format!("{}{}", self.host, path));
        match &self.api_key {
            Some(key) => rb.bearer_auth(key),
            None => rb,
        }
    }

    /// Send a request and decode the JSON body, mapping failures.
    ///
    /// `index` names the index the request targets and is used to build
    /// not-found errors.
    async fn send<T: DeserializeOwned>(&self, rb: RequestBuilder, index: &str) -> IndexResult<T> {
        let response = rb
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| IndexError::Unavailable(format!("malformed response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, &body, index))
    }
}

fn map_error(status: StatusCode, body: &str, index: &str) -> IndexError {
    let parsed: Option<MeiliErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(e) => (e.code, e.message),
        None => (String::new(), body.to_string()),
    };

    match code.as_str() {
        "index_not_found" => IndexError::IndexNotFound(index.to_string()),
        "index_already_exists" => IndexError::IndexAlreadyExists(index.to_string()),
        "invalid_search_filter" => IndexError::InvalidFilter(message),
        c if c.starts_with("invalid_") && c != "invalid_api_key" => {
            IndexError::InvalidRequest(message)
        }
        c if c.starts_with("missing_") && c != "missing_authorization_header" => {
            IndexError::InvalidRequest(message)
        }
        _ => IndexError::Unavailable(format!("Meilisearch error {}: {}", status, message)),
    }
}

#[async_trait]
impl IndexService for MeiliIndex {
    async fn create_index(&self, name: &str, primary_key: &str) -> IndexResult<Task> {
        let body = serde_json::json!({ "uid": name, "primaryKey": primary_key });
        self.send(self.request(Method::POST, "/indexes").json(&body), name)
            .await
    }

    async fn delete_index(&self, name: &str) -> IndexResult<Task> {
        // Deleting a missing index only fails inside the task; check first
        // so callers get a synchronous not-found.
        self.get_index(name).await?;
        self.send(
            self.request(Method::DELETE, &format!("/indexes/{}", name)),
            name,
        )
        .await
    }

    async fn get_index(&self, name: &str) -> IndexResult<IndexInfo> {
        self.send(self.request(Method::GET, &format!("/indexes/{}", name)), name)
            .await
    }

    async fn list_indexes(&self) -> IndexResult<Vec<IndexInfo>> {
        let list: IndexList = self
            .send(self.request(Method::GET, "/indexes?limit=1000"), "")
            .await?;
        Ok(list.results)
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> IndexResult<SearchResponse> {
        self.send(
            self.request(Method::POST, &format!("/indexes/{}/search", index))
                .json(query),
            index,
        )
        .await
    }

    async fn add_documents(
        &self,
        index: &str,
        documents: &[Value],
        primary_key: Option<&str>,
    ) -> IndexResult<Task> {
        let mut rb = self.request(Method::POST, &format!("/indexes/{}/documents", index));
        if let Some(pk) = primary_key {
            rb = rb.query(&[("primaryKey", pk)]);
        }
        self.send(rb.json(documents), index).await
    }

    async fn get_documents(
        &self,
        index: &str,
        limit: usize,
        offset: usize,
    ) -> IndexResult<DocumentsPage> {
        self.send(
            self.request(Method::GET, &format!("/indexes/{}/documents", index))
                .query(&[("limit", limit), ("offset", offset)]),
            index,
        )
        .await
    }

    async fn delete_all_documents(&self, index: &str) -> IndexResult<Task> {
        self.send(
            self.request(Method::DELETE, &format!("/indexes/{}/documents", index)),
            index,
        )
        .await
    }

    async fn delete_documents(&self, index: &str, ids: &[String]) -> IndexResult<Task> {
        self.send(
            self.request(
                Method::POST,
                &format!("/indexes/{}/documents/delete-batch", index),
            )
            .json(ids),
            index,
        )
        .await
    }

    async fn update_searchable_attributes(
        &self,
        index: &str,
        attributes: &[String],
    ) -> IndexResult<Task> {
        self.send(
            self.request(
                Method::PUT,
                &format!("/indexes/{}/settings/searchable-attributes", index),
            )
            .json(attributes),
            index,
        )
        .await
    }

    async fn update_filterable_attributes(
        &self,
        index: &str,
        attributes: &[String],
    ) -> IndexResult<Task> {
        self.send(
            self.request(
                Method::PUT,
                &format!("/indexes/{}/settings/filterable-attributes", index),
            )
            .json(attributes),
            index,
        )
        .await
    }

    async fn get_stats(&self, index: &str) -> IndexResult<IndexStats> {
        self.send(
            self.request(Method::GET, &format!("/indexes/{}/stats", index)),
            index,
        )
        .await
    }

    async fn get_task(&self, uid: u64) -> IndexResult<Task> {
        self.send(self.request(Method::GET, &format!("/tasks/{}", uid)), "")
            .await
    }
}
