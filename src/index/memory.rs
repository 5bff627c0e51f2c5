//! In-memory [`IndexService`] implementation for tests and offline use.
//!
//! Uses a `BTreeMap` of indexes behind `std::sync::RwLock`. Every write is
//! applied immediately and its task is recorded as already settled, so
//! [`wait_for_task`](super::wait_for_task) returns on the first check.
//!
//! Ranking is deliberately simple: query terms are matched as word prefixes
//! against the searchable attributes; documents are ordered by the number of
//! matched terms, then by the earliest attribute a term matched in, then by
//! insertion order. Filters follow the subset in [`super::filter`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::filter::Filter;
use super::{
    DocumentsPage, IndexError, IndexInfo, IndexResult, IndexService, IndexStats, Task,
    TaskErrorInfo, TaskStatus,
};
use crate::models::{FacetDistribution, SearchQuery, SearchResponse};

struct StoredIndex {
    info: IndexInfo,
    docs: Vec<Value>,
    searchable: Vec<String>,
    filterable: Vec<String>,
}

impl StoredIndex {
    fn new(uid: &str, primary_key: Option<&str>) -> Self {
        let now = now_rfc3339();
        Self {
            info: IndexInfo {
                uid: uid.to_string(),
                primary_key: primary_key.map(str::to_string),
                created_at: Some(now.clone()),
                updated_at: Some(now),
            },
            docs: Vec::new(),
            searchable: vec!["*".to_string()],
            filterable: Vec::new(),
        }
    }

    fn touch(&mut self) {
        self.info.updated_at = Some(now_rfc3339());
    }

    fn primary_key(&self) -> &str {
        self.info.primary_key.as_deref().unwrap_or("id")
    }

    /// Searchable attribute names for `doc`, in ranking order.
    fn searchable_for<'a>(&'a self, doc: &'a Value) -> Vec<&'a str> {
        if self.searchable.iter().any(|a| a == "*") {
            doc.as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default()
        } else {
            self.searchable.iter().map(String::as_str).collect()
        }
    }
}

struct Inner {
    indexes: BTreeMap<String, StoredIndex>,
    tasks: HashMap<u64, Task>,
    held: HashMap<u64, Task>,
    next_task: u64,
    hold: bool,
}

/// Process-local search index.
pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                indexes: BTreeMap::new(),
                tasks: HashMap::new(),
                held: HashMap::new(),
                next_task: 0,
                hold: false,
            }),
        }
    }

    /// Report new tasks as `enqueued` until released.
    ///
    /// Writes are still applied immediately; only the reported task status
    /// changes. Lets tests exercise the bounded wait without a real server.
    pub fn hold_tasks(&self, hold: bool) {
        let mut inner = self.inner.write().unwrap();
        inner.hold = hold;
        if !hold {
            let released: Vec<Task> = inner.held.drain().map(|(_, t)| t).collect();
            for task in released {
                inner.tasks.insert(task.task_uid, task);
            }
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Record a settled task and return the status callers should see.
fn record_task(
    inner: &mut Inner,
    index_uid: &str,
    kind: &str,
    outcome: Result<(), (&str, String)>,
) -> Task {
    inner.next_task += 1;
    let (status, error) = match outcome {
        Ok(()) => (TaskStatus::Succeeded, None),
        Err((code, message)) => (
            TaskStatus::Failed,
            Some(TaskErrorInfo {
                message,
                code: code.to_string(),
            }),
        ),
    };
    let settled = Task {
        task_uid: inner.next_task,
        index_uid: Some(index_uid.to_string()),
        status,
        kind: kind.to_string(),
        error,
    };

    if inner.hold {
        let pending = Task {
            status: TaskStatus::Enqueued,
            error: None,
            ..settled.clone()
        };
        inner.tasks.insert(pending.task_uid, pending.clone());
        inner.held.insert(settled.task_uid, settled);
        pending
    } else {
        inner.tasks.insert(settled.task_uid, settled.clone());
        settled
    }
}

fn missing_index(name: &str) -> (&'static str, String) {
    ("index_not_found", format!("Index `{}` not found.", name))
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lowercase_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn field_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(field_text)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    }
}

fn word_matches(word: &str, term: &str) -> bool {
    word.to_lowercase().starts_with(term)
}

/// Relevance of `doc` for `terms`: (matched term count, best attribute rank).
fn score(doc: &Value, attrs: &[&str], terms: &[String]) -> (usize, usize) {
    let mut matched = 0;
    let mut best = usize::MAX;
    for term in terms {
        let hit = attrs.iter().position(|attr| {
            doc.get(*attr)
                .and_then(field_text)
                .map(|text| {
                    text.split(|c: char| !c.is_alphanumeric())
                        .any(|w| !w.is_empty() && word_matches(w, term))
                })
                .unwrap_or(false)
        });
        if let Some(rank) = hit {
            matched += 1;
            best = best.min(rank);
        }
    }
    (matched, best)
}

/// Wrap the matched prefix of every matching word in `<em>` tags.
fn highlight(text: &str, terms: &[String]) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        let lower = word.to_lowercase();
        let best = terms
            .iter()
            .filter(|t| lower.starts_with(t.as_str()))
            .map(|t| t.chars().count())
            .max();
        match best {
            Some(n) => {
                let split = word
                    .char_indices()
                    .nth(n)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                out.push_str("<em>");
                out.push_str(&word[..split]);
                out.push_str("</em>");
                out.push_str(&word[split..]);
            }
            None => out.push_str(word),
        }
        word.clear();
    };

    for c in text.chars() {
        if c.is_alphanumeric() {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

fn project(doc: &Value, retrieve: &[String]) -> Map<String, Value> {
    let obj = doc.as_object().cloned().unwrap_or_default();
    if retrieve.is_empty() || retrieve.iter().any(|a| a == "*") {
        return obj;
    }
    obj.into_iter()
        .filter(|(k, _)| retrieve.iter().any(|a| a == k))
        .collect()
}

fn sort_key(doc: &Value, attr: &str) -> Option<String> {
    doc.get(attr).and_then(field_text)
}

fn parse_sort(sort: &[String]) -> IndexResult<Vec<(String, bool)>> {
    sort.iter()
        .map(|s| match s.rsplit_once(':') {
            Some((attr, "asc")) if !attr.is_empty() => Ok((attr.to_string(), false)),
            Some((attr, "desc")) if !attr.is_empty() => Ok((attr.to_string(), true)),
            _ => Err(IndexError::InvalidRequest(format!(
                "Invalid sort `{}`: expected `attribute:asc` or `attribute:desc`",
                s
            ))),
        })
        .collect()
}

#[async_trait]
impl IndexService for MemoryIndex {
    async fn create_index(&self, name: &str, primary_key: &str) -> IndexResult<Task> {
        let mut inner = self.inner.write().unwrap();
        let outcome = if inner.indexes.contains_key(name) {
            Err((
                "index_already_exists",
                format!("Index `{}` already exists.", name),
            ))
        } else {
            inner
                .indexes
                .insert(name.to_string(), StoredIndex::new(name, Some(primary_key)));
            Ok(())
        };
        Ok(record_task(&mut inner, name, "indexCreation", outcome))
    }

    async fn delete_index(&self, name: &str) -> IndexResult<Task> {
        let mut inner = self.inner.write().unwrap();
        if inner.indexes.remove(name).is_none() {
            return Err(IndexError::IndexNotFound(name.to_string()));
        }
        Ok(record_task(&mut inner, name, "indexDeletion", Ok(())))
    }

    async fn get_index(&self, name: &str) -> IndexResult<IndexInfo> {
        let inner = self.inner.read().unwrap();
        inner
            .indexes
            .get(name)
            .map(|idx| idx.info.clone())
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))
    }

    async fn list_indexes(&self) -> IndexResult<Vec<IndexInfo>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.indexes.values().map(|idx| idx.info.clone()).collect())
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> IndexResult<SearchResponse> {
        let started = Instant::now();
        let inner = self.inner.read().unwrap();
        let idx = inner
            .indexes
            .get(index)
            .ok_or_else(|| IndexError::IndexNotFound(index.to_string()))?;

        let filter = query
            .filter
            .as_deref()
            .map(|f| Filter::parse(f, &idx.filterable))
            .transpose()?;
        let sort = parse_sort(query.sort.as_deref().unwrap_or_default())?;
        if let Some(facets) = &query.facets {
            if let Some(bad) = facets.iter().find(|f| !idx.filterable.contains(f)) {
                return Err(IndexError::InvalidRequest(format!(
                    "Invalid facet `{}`: attribute is not filterable",
                    bad
                )));
            }
        }

        let terms = lowercase_terms(&query.text);

        let mut candidates: Vec<(usize, usize, &Value)> = Vec::new();
        for doc in &idx.docs {
            if let Some(f) = &filter {
                if !f.matches(doc) {
                    continue;
                }
            }
            if terms.is_empty() {
                candidates.push((0, 0, doc));
                continue;
            }
            let (matched, best) = score(doc, &idx.searchable_for(doc), &terms);
            if matched > 0 {
                candidates.push((matched, best, doc));
            }
        }

        // Sort criteria break ties left by relevance; insertion order breaks the rest.
        for (attr, descending) in sort.iter().rev() {
            candidates.sort_by(|a, b| {
                let ord = sort_key(a.2, attr).cmp(&sort_key(b.2, attr));
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        candidates.sort_by(|a, b| match b.0.cmp(&a.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        });

        let facet_distribution = query.facets.as_ref().map(|facets| {
            let mut dist = FacetDistribution::new();
            for facet in facets {
                let counts = dist.entry(facet.clone()).or_default();
                for (_, _, doc) in &candidates {
                    match doc.get(facet) {
                        Some(Value::Array(items)) => {
                            for v in items.iter().filter_map(field_text) {
                                *counts.entry(v).or_default() += 1;
                            }
                        }
                        Some(v) => {
                            if let Some(v) = field_text(v) {
                                *counts.entry(v).or_default() += 1;
                            }
                        }
                        None => {}
                    }
                }
            }
            dist
        });

        let total = candidates.len() as u64;
        let hits = candidates
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(_, _, doc)| {
                let mut hit = project(doc, &query.attributes_to_retrieve);
                if !query.attributes_to_highlight.is_empty() {
                    let all = query.attributes_to_highlight.iter().any(|a| a == "*");
                    let mut formatted = hit.clone();
                    for (key, value) in formatted.iter_mut() {
                        if !all && !query.attributes_to_highlight.contains(key) {
                            continue;
                        }
                        if let Value::String(s) = value {
                            *s = highlight(s, &terms);
                        }
                    }
                    hit.insert("_formatted".to_string(), Value::Object(formatted));
                }
                Value::Object(hit)
            })
            .collect();

        Ok(SearchResponse {
            hits,
            processing_time_ms: started.elapsed().as_millis() as u64,
            limit: query.limit,
            offset: query.offset,
            estimated_total_hits: total,
            total_hits: None,
            total_pages: None,
            hits_per_page: None,
            page: None,
            facet_distribution,
        })
    }

    async fn add_documents(
        &self,
        index: &str,
        documents: &[Value],
        primary_key: Option<&str>,
    ) -> IndexResult<Task> {
        let mut inner = self.inner.write().unwrap();
        let idx = inner
            .indexes
            .entry(index.to_string())
            .or_insert_with(|| StoredIndex::new(index, Some(primary_key.unwrap_or("id"))));
        let pk = idx.primary_key().to_string();

        let mut outcome = Ok(());
        let mut keyed = Vec::with_capacity(documents.len());
        for doc in documents {
            match doc.get(&pk).and_then(id_string) {
                Some(id) if doc.is_object() => keyed.push((id, doc.clone())),
                _ => {
                    outcome = Err((
                        "missing_document_id",
                        format!("Document doesn't have a `{}` attribute: `{}`.", pk, doc),
                    ));
                    break;
                }
            }
        }

        if outcome.is_ok() {
            for (id, doc) in keyed {
                let existing = idx
                    .docs
                    .iter()
                    .position(|d| d.get(&pk).and_then(id_string).as_deref() == Some(&id));
                match existing {
                    Some(pos) => idx.docs[pos] = doc,
                    None => idx.docs.push(doc),
                }
            }
            idx.touch();
        }

        Ok(record_task(
            &mut inner,
            index,
            "documentAdditionOrUpdate",
            outcome,
        ))
    }

    async fn get_documents(
        &self,
        index: &str,
        limit: usize,
        offset: usize,
    ) -> IndexResult<DocumentsPage> {
        let inner = self.inner.read().unwrap();
        let idx = inner
            .indexes
            .get(index)
            .ok_or_else(|| IndexError::IndexNotFound(index.to_string()))?;
        Ok(DocumentsPage {
            results: idx.docs.iter().skip(offset).take(limit).cloned().collect(),
            offset,
            limit,
            total: idx.docs.len() as u64,
        })
    }

    async fn delete_all_documents(&self, index: &str) -> IndexResult<Task> {
        let mut inner = self.inner.write().unwrap();
        let outcome = match inner.indexes.get_mut(index) {
            Some(idx) => {
                idx.docs.clear();
                idx.touch();
                Ok(())
            }
            None => Err(missing_index(index)),
        };
        Ok(record_task(&mut inner, index, "documentDeletion", outcome))
    }

    async fn delete_documents(&self, index: &str, ids: &[String]) -> IndexResult<Task> {
        let mut inner = self.inner.write().unwrap();
        let outcome = match inner.indexes.get_mut(index) {
            Some(idx) => {
                let pk = idx.primary_key().to_string();
                idx.docs.retain(|d| {
                    d.get(&pk)
                        .and_then(id_string)
                        .map(|id| !ids.contains(&id))
                        .unwrap_or(true)
                });
                idx.touch();
                Ok(())
            }
            None => Err(missing_index(index)),
        };
        Ok(record_task(&mut inner, index, "documentDeletion", outcome))
    }

    async fn update_searchable_attributes(
        &self,
        index: &str,
        attributes: &[String],
    ) -> IndexResult<Task> {
        let mut inner = self.inner.write().unwrap();
        let idx = inner
            .indexes
            .entry(index.to_string())
            .or_insert_with(|| StoredIndex::new(index, None));
        idx.searchable = attributes.to_vec();
        idx.touch();
        Ok(record_task(&mut inner, index, "settingsUpdate", Ok(())))
    }

    async fn update_filterable_attributes(
        &self,
        index: &str,
        attributes: &[String],
    ) -> IndexResult<Task> {
        let mut inner = self.inner.write().unwrap();
        let idx = inner
            .indexes
            .entry(index.to_string())
            .or_insert_with(|| StoredIndex::new(index, None));
        idx.filterable = attributes.to_vec();
        idx.touch();
        Ok(record_task(&mut inner, index, "settingsUpdate", Ok(())))
    }

    async fn get_stats(&self, index: &str) -> IndexResult<IndexStats> {
        let inner = self.inner.read().unwrap();
        let idx = inner
            .indexes
            .get(index)
            .ok_or_else(|| IndexError::IndexNotFound(index.to_string()))?;
        let mut field_distribution = BTreeMap::new();
        for doc in &idx.docs {
            if let Some(obj) = doc.as_object() {
                for key in obj.keys() {
                    *field_distribution.entry(key.clone()).or_insert(0) += 1;
                }
            }
        }
        Ok(IndexStats {
            number_of_documents: idx.docs.len() as u64,
            is_indexing: false,
            field_distribution,
        })
    }

    async fn get_task(&self, uid: u64) -> IndexResult<Task> {
        let inner = self.inner.read().unwrap();
        inner
            .tasks
            .get(&uid)
            .cloned()
            .ok_or_else(|| IndexError::InvalidRequest(format!("Task `{}` not found.", uid)))
    }
}
