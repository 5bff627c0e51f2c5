//! Search index client abstraction.
//!
//! The portal never ranks documents itself. It drives an external index
//! service through the [`IndexService`] trait:
//!
//! - **[`MeiliIndex`]**: talks to a Meilisearch server over HTTP.
//! - **[`MemoryIndex`]**: process-local index for tests and offline use.
//!
//! Every write returns a [`Task`]. Writes complete out of band, so callers
//! that need to read their own writes go through [`wait_for_task`], which
//! polls with exponential backoff under a hard deadline.
//!
//! # Backend Selection
//!
//! Use [`create_index_service`] to instantiate the backend named by
//! `[index].backend` in the configuration.

pub mod filter;
pub mod meili;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::IndexConfig;
use crate::models::{SearchQuery, SearchResponse};

pub use meili::MeiliIndex;
pub use memory::MemoryIndex;

/// Errors raised by index backends.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("{0}")]
    InvalidFilter(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("task {uid} failed: {message}")]
    TaskFailed { uid: u64, message: String },

    #[error("task {uid} did not finish within {waited_ms}ms")]
    Timeout { uid: u64, waited_ms: u64 },

    #[error("search index unavailable: {0}")]
    Unavailable(String),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

/// An asynchronously processed write against the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "uid")]
    pub task_uid: u64,
    #[serde(default)]
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskErrorInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorInfo {
    pub message: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub uid: String,
    pub primary_key: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub number_of_documents: u64,
    pub is_indexing: bool,
    #[serde(default)]
    pub field_distribution: BTreeMap<String, u64>,
}

/// A page of raw documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentsPage {
    pub results: Vec<serde_json::Value>,
    pub offset: usize,
    pub limit: usize,
    pub total: u64,
}

/// Index, document and query primitives of the external search service.
///
/// Implementations must be `Send + Sync`; a single instance is shared by all
/// request handlers.
#[async_trait]
pub trait IndexService: Send + Sync {
    async fn create_index(&self, name: &str, primary_key: &str) -> IndexResult<Task>;

    /// Fails with [`IndexError::IndexNotFound`] when the index is absent.
    async fn delete_index(&self, name: &str) -> IndexResult<Task>;

    /// Fails with [`IndexError::IndexNotFound`] when the index is absent.
    async fn get_index(&self, name: &str) -> IndexResult<IndexInfo>;

    async fn list_indexes(&self) -> IndexResult<Vec<IndexInfo>>;

    async fn search(&self, index: &str, query: &SearchQuery) -> IndexResult<SearchResponse>;

    async fn add_documents(
        &self,
        index: &str,
        documents: &[serde_json::Value],
        primary_key: Option<&str>,
    ) -> IndexResult<Task>;

    async fn get_documents(
        &self,
        index: &str,
        limit: usize,
        offset: usize,
    ) -> IndexResult<DocumentsPage>;

    async fn delete_all_documents(&self, index: &str) -> IndexResult<Task>;

    async fn delete_documents(&self, index: &str, ids: &[String]) -> IndexResult<Task>;

    async fn update_searchable_attributes(
        &self,
        index: &str,
        attributes: &[String],
    ) -> IndexResult<Task>;

    async fn update_filterable_attributes(
        &self,
        index: &str,
        attributes: &[String],
    ) -> IndexResult<Task>;

    async fn get_stats(&self, index: &str) -> IndexResult<IndexStats>;

    async fn get_task(&self, uid: u64) -> IndexResult<Task>;
}

/// Whether `name` is a legal index uid: 1-400 ASCII alphanumerics,
/// hyphens or underscores.
pub fn is_valid_uid(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 400
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Bounds for [`wait_for_task`].
#[derive(Debug, Clone, Copy)]
pub struct TaskWait {
    pub timeout: Duration,
    pub first_poll: Duration,
}

impl TaskWait {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.task_timeout_ms),
            first_poll: Duration::from_millis(config.task_poll_ms),
        }
    }
}

impl Default for TaskWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            first_poll: Duration::from_millis(50),
        }
    }
}

const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll a task until it reaches a terminal state.
///
/// Backoff doubles from `wait.first_poll` up to one second. Returns the
/// settled task on success; a failed or canceled task becomes
/// [`IndexError::TaskFailed`] (or `IndexAlreadyExists` / `IndexNotFound`
/// for those task error codes), and running past `wait.timeout` becomes
/// [`IndexError::Timeout`].
pub async fn wait_for_task(
    index: &dyn IndexService,
    task: &Task,
    wait: TaskWait,
) -> IndexResult<Task> {
    let started = Instant::now();
    let mut current = task.clone();
    let mut interval = wait.first_poll;

    loop {
        match current.status {
            TaskStatus::Succeeded => return Ok(current),
            TaskStatus::Failed | TaskStatus::Canceled => return Err(task_error(&current)),
            TaskStatus::Enqueued | TaskStatus::Processing => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= wait.timeout {
            tracing::warn!(
                task_uid = current.task_uid,
                kind = %current.kind,
                "index task did not settle in time"
            );
            return Err(IndexError::Timeout {
                uid: current.task_uid,
                waited_ms: elapsed.as_millis() as u64,
            });
        }

        let sleep_for = interval.min(wait.timeout - elapsed);
        tokio::time::sleep(sleep_for).await;
        interval = (interval * 2).min(MAX_POLL_INTERVAL);

        tracing::debug!(task_uid = current.task_uid, "polling index task");
        current = index.get_task(current.task_uid).await?;
    }
}

/// Index lifecycle failures are only reported inside the task, so their
/// codes map back to the same errors a synchronous call would give.
fn task_error(task: &Task) -> IndexError {
    let index = task.index_uid.clone().unwrap_or_default();
    match task.error.as_ref() {
        Some(e) if e.code == "index_already_exists" => IndexError::IndexAlreadyExists(index),
        Some(e) if e.code == "index_not_found" => IndexError::IndexNotFound(index),
        Some(e) => IndexError::TaskFailed {
            uid: task.task_uid,
            message: e.message.clone(),
        },
        None => IndexError::TaskFailed {
            uid: task.task_uid,
            message: format!("task {:?}", task.status),
        },
    }
}

/// Instantiate the backend selected by `[index].backend`.
pub fn create_index_service(config: &IndexConfig) -> anyhow::Result<Arc<dyn IndexService>> {
    match config.backend.as_str() {
        "meilisearch" => Ok(Arc::new(MeiliIndex::connect(
            &config.host,
            config.resolved_api_key().as_deref(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be meilisearch or memory.",
            other
        ),
    }
}
